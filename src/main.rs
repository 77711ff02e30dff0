/// orgiam server binary
use anyhow::Context;
use orgiam::{config::ServerConfig, context::AppContext, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    let filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let fmt_layer = if config.logging.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    print_banner();

    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application context")?;

    server::serve(ctx).await.context("Server exited with an error")?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ____  _________ _(_)___ _____ ___
  / __ \/ ___/ __ `/ / __ `/ __ `__ \
 / /_/ / /  / /_/ / / /_/ / / / / / /
 \____/_/   \__, /_/\__,_/_/ /_/ /_/
           /____/
        Member directory and identity service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
