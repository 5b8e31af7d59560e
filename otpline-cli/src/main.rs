//! otpline-cli — poll the otpline HTTP API for one-time codes
//!
//! # Subcommands
//! - `latest (--number <n> | --session-id <id>) [--json]` — newest code for a number or session
//! - `watch  (--number <n> | --session-id <id>) [--timeout <s>]` — wait for a new code to arrive
//! - `send --to <n> --text <t> [--from <n>] [--id <id>]` — post a synthetic inbound SMS webhook
//! - `status` — show server health

use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const WEBHOOK_PATH: &str = "/webhooks/telnyx/sms";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "otpline-cli", version, about = "otpline one-time code lookup")]
struct Cli {
    /// otpline HTTP server URL (overrides OTPLINE_HTTP_URL env var)
    #[arg(long, env = "OTPLINE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args, Clone)]
pub struct Target {
    /// Allocated number, any formatting
    #[arg(long, conflicts_with = "session_id", required_unless_present = "session_id")]
    pub number: Option<String>,

    /// Session id
    #[arg(long)]
    pub session_id: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the newest code for a number or session
    Latest {
        #[command(flatten)]
        target: Target,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Poll until a code newer than the current one arrives
    Watch {
        #[command(flatten)]
        target: Target,

        /// Poll interval in seconds
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Post a synthetic inbound SMS to the webhook endpoint
    Send {
        #[arg(long)]
        to: String,

        #[arg(long)]
        text: String,

        #[arg(long)]
        from: Option<String>,

        /// Provider message id used for dedupe
        #[arg(long)]
        id: Option<String>,
    },

    /// Show otpline server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Body of `GET /otp/latest`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct LatestResponse {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub at: Option<String>,
}

impl LatestResponse {
    /// Identity of the newest message, used by `watch` to detect arrivals.
    fn marker(&self) -> Option<(String, String)> {
        match (&self.session_id, &self.at) {
            (Some(s), Some(a)) => Some((s.clone(), a.clone())),
            _ => None,
        }
    }
}

/// Query string for `GET /otp/latest`.
pub fn latest_query(target: &Target) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(id) = &target.session_id {
        params.push(("sessionId", id.clone()));
    }
    if let Some(n) = &target.number {
        params.push(("number", n.clone()));
    }
    params
}

/// Human-readable rendering of a latest-message response.
pub fn format_latest(resp: &LatestResponse) -> String {
    let session = match &resp.session_id {
        Some(s) => s,
        None => return "No session found".to_string(),
    };

    let mut out = format!("Session: {}\n", session);
    match (&resp.code, &resp.message) {
        (Some(code), _) => out.push_str(&format!("Code:    {}\n", code)),
        (None, Some(_)) => out.push_str("Code:    (none in message)\n"),
        (None, None) => out.push_str("Code:    (no messages yet)\n"),
    }
    if let Some(at) = &resp.at {
        out.push_str(&format!("At:      {}\n", at));
    }
    if let Some(message) = &resp.message {
        let preview: String = message.chars().take(160).collect();
        out.push_str(&format!("Message: {}\n", preview));
    }
    out
}

/// Webhook body shaped like the provider's event envelope.
pub fn webhook_body(to: &str, text: &str, from: Option<&str>, id: Option<&str>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "to": [{ "phone_number": to }],
        "text": text,
    });
    if let Some(from) = from {
        payload["from"] = serde_json::json!({ "phone_number": from });
    }
    if let Some(id) = id {
        payload["id"] = serde_json::Value::String(id.to_string());
    }
    serde_json::json!({ "data": { "event_type": "message.received", "payload": payload } })
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn fetch_latest(
    client: &reqwest::blocking::Client,
    server: &str,
    target: &Target,
) -> anyhow::Result<LatestResponse> {
    let url = format!("{}/otp/latest", server);
    let resp = client.get(&url).query(&latest_query(target)).send()?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        anyhow::bail!("server returned {}: {}", status, body);
    }

    Ok(resp.json()?)
}

fn do_latest(server: &str, target: &Target, json_output: bool) -> anyhow::Result<()> {
    let client = client(10)?;
    let latest = match fetch_latest(&client, server, target) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("otpline-cli: latest lookup failed: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!(
            "{}",
            serde_json::json!({
                "sessionId": latest.session_id,
                "code": latest.code,
                "message": latest.message,
                "at": latest.at,
            })
        );
    } else {
        print!("{}", format_latest(&latest));
    }
    Ok(())
}

fn do_watch(server: &str, target: &Target, interval: u64, timeout: u64) -> anyhow::Result<()> {
    let client = client(10)?;
    let baseline = fetch_latest(&client, server, target)?.marker();
    let deadline = Instant::now() + Duration::from_secs(timeout);

    eprintln!("Waiting for a new code (timeout {}s)...", timeout);
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(interval.max(1)));
        let latest = match fetch_latest(&client, server, target) {
            Ok(l) => l,
            Err(e) => {
                eprintln!("otpline-cli: poll failed: {}", e);
                continue;
            }
        };
        if latest.marker().is_some() && latest.marker() != baseline {
            print!("{}", format_latest(&latest));
            return Ok(());
        }
    }

    eprintln!("otpline-cli: no new code within {}s", timeout);
    std::process::exit(2);
}

fn do_send(server: &str, to: &str, text: &str, from: Option<&str>, id: Option<&str>) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}{}", server, WEBHOOK_PATH);
    let resp = client.post(&url).json(&webhook_body(to, text, from, id)).send()?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        eprintln!("otpline-cli: webhook rejected (HTTP {}): {}", status, body);
        std::process::exit(1);
    }
    match body["skip"].as_str() {
        Some(reason) => println!("Skipped: {}", reason),
        None => println!("Accepted"),
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("otpline server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:          {}", body["store"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("otpline-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("otpline-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Latest { target, json } => do_latest(&server, &target, json),
        Commands::Watch {
            target,
            interval,
            timeout,
        } => do_watch(&server, &target, interval, timeout),
        Commands::Send { to, text, from, id } => {
            do_send(&server, &to, &text, from.as_deref(), id.as_deref())
        }
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("otpline-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
