//! LogRelay Producer Example
//!
//! Sends a handful of records from several loggers to a running receiver.
//!
//! Usage: cargo run --example producer -- [host] [port]

use logrelay::client::LogClient;
use logrelay::types::Extras;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = args.next().unwrap_or_else(|| "9020".to_string());
    let addr = format!("{}:{}", host, port);

    println!("Sending sample records to {}", addr);

    let app = LogClient::connect(&addr, "myapp").await?;
    app.info("Jackdaws love my big sphinx of quartz.").await?;

    let area1 = LogClient::connect(&addr, "myapp.area1").await?;
    let area2 = LogClient::connect(&addr, "myapp.area2").await?;

    area1.debug("Quick zephyrs blow, vexing daft Jim.").await?;
    area1.info("How quickly daft jumping zebras vex.").await?;
    area2.warning("Jail zesty vixen who grabbed pay from quack.").await?;
    area2.critical("A failure occurred.").await?;

    let mut extra = Extras::new();
    extra.insert("a_num".to_string(), 42.into());
    area2
        .error_with_extra("The five boxing wizards jump quickly.", extra)
        .await?;

    let mut info = Extras::new();
    info.insert("even_more".to_string(), 14.8.into());
    info.insert("user".to_string(), "john".into());
    app.exception(
        "exception message",
        "Traceback (most recent call last):\nZeroDivisionError: division by zero",
        info,
    )
    .await?;

    for client in [app, area1, area2] {
        client.close().await?;
    }

    println!("Done");
    Ok(())
}
