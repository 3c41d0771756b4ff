use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use metrowifi_rs::{
    AuthConfig, Authenticator, LogLevel, MemoryHandler, UserAgentOptions, VERSION,
};
use tokio::runtime::Runtime;

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_bool(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => true,
        "n" | "no" | "false" => false,
        _ => default,
    }
}

fn parse_u32(input: &str, default: u32) -> u32 {
    input.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
}

#[test]
#[ignore = "Requires a captive portal network and manual input"]
fn interactive_portal_login() -> Result<(), Box<dyn Error>> {
    println!("metrowifi-rs {} interactive smoke test", VERSION);
    println!("Connect to the portal network first. Press Enter to accept defaults.\n");

    let desktop_answer = prompt("Use desktop user-agent? (y/N):")?;
    let v3_answer = prompt("Handle welcome.wi-fi.ru natively? (Y/n):")?;
    let delay_answer = prompt("Random delay before every request? (y/N):")?;
    let retries_answer = prompt("Retry count [3]:")?;
    let verbose_answer = prompt("Print debug log? (y/N):")?;

    let mut ua_opts = UserAgentOptions::default();
    if parse_bool(&desktop_answer, false) {
        ua_opts.desktop = true;
        ua_opts.mobile = false;
        ua_opts.platform = Some("linux".into());
    }

    let config = AuthConfig {
        welcome_gateway_v3: parse_bool(&v3_answer, true),
        delay_always: parse_bool(&delay_answer, false),
        retry_count: parse_u32(&retries_answer, 3),
        ..AuthConfig::default()
    };

    let memory = Arc::new(MemoryHandler::new(2048));
    let authenticator = Authenticator::builder()
        .with_config(config)
        .with_user_agent_options(ua_opts)
        .with_handler(memory.clone())
        .build()?;
    let runtime = Runtime::new()?;

    println!("\nProbing {}...", authenticator.config().probe_url);
    let probe = runtime.block_on(authenticator.probe())?;
    println!("Probe status: {}", probe.status());

    let outcome = runtime.block_on(authenticator.start(probe));
    println!("Provider: {}", outcome.provider);
    if !outcome.switched.is_empty() {
        println!("Switched to: {:?}", outcome.switched);
    }
    println!("Result: {:?}", outcome.result);
    if let Some(ref error) = outcome.error {
        println!("Error: {error}");
    }
    println!("Last step: {}", outcome.progress.as_deref().unwrap_or("-"));

    let level = if parse_bool(&verbose_answer, false) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    println!("\n--- Log ---");
    for line in memory.messages(level) {
        println!("{line}");
    }

    println!("\nConnected now: {}", runtime.block_on(authenticator.is_connected()));
    Ok(())
}
