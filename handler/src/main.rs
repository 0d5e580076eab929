use std::io;
use std::process::ExitCode;

use clap::Parser;
use triage_ai::llm::credentials::DefaultCredentialChain;
use triage_handler::{env_lookup, handle_event, read_event, HandlerConfig};
use triage_notify::slack::SlackNotifier;

/// Triage one incident event: normalize, analyze with an LLM, and notify chat and paging.
#[derive(Debug, clap::Parser)]
#[clap(author, name = "triage-handler", version, about)]
struct Cli {
    /// Log filter directives, e.g. `info` or `triage_ai=debug`.
    #[clap(long, global = true, default_value = "info", env = "TRIAGE_LOG")]
    log: String,

    #[clap(flatten)]
    settings: Settings,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct Settings {
    /// `1` selects the Bedrock gateway; anything else the direct Anthropic API.
    #[clap(long, global = true, default_value = "1", env = "USE_BEDROCK")]
    use_bedrock: String,
    #[clap(long, global = true, default_value = "", env = "AWS_REGION")]
    aws_region: String,
    #[clap(long, global = true, default_value = "", env = "BEDROCK_MODEL_ID")]
    bedrock_model_id: String,
    #[clap(long, global = true, env = "CLAUDE_API_KEY", hide_env_values = true)]
    claude_api_key: Option<String>,
    #[clap(long, global = true, default_value = "", env = "ANTHROPIC_MODEL")]
    anthropic_model: String,
    #[clap(long, global = true, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    slack_webhook_url: Option<String>,
    #[clap(long, global = true, env = "PAGERDUTY_INTEGRATION_KEY", hide_env_values = true)]
    pagerduty_integration_key: Option<String>,
    /// `1` enables live cluster enrichment of pod failures.
    #[clap(long, global = true, default_value = "0", env = "K8S_ENRICH")]
    k8s_enrich: String,
    #[clap(long, global = true, default_value = "unknown", env = "K8S_CLUSTER_NAME")]
    k8s_cluster_name: String,
    #[clap(long, global = true, env = "K8S_API_URL")]
    k8s_api_url: Option<String>,
    #[clap(long, global = true, env = "K8S_TOKEN", hide_env_values = true)]
    k8s_token: Option<String>,
    #[clap(long, global = true, env = "K8S_CA_FILE")]
    k8s_ca_file: Option<String>,
}

impl Settings {
    fn into_config(self) -> HandlerConfig {
        HandlerConfig {
            use_bedrock: self.use_bedrock.trim() == "1",
            aws_region: self.aws_region,
            bedrock_model_id: self.bedrock_model_id,
            claude_api_key: self.claude_api_key,
            anthropic_model: self.anthropic_model,
            slack_webhook_url: self.slack_webhook_url,
            pagerduty_integration_key: self.pagerduty_integration_key,
            k8s_enrich: self.k8s_enrich.trim() == "1",
            k8s_cluster_name: self.k8s_cluster_name,
            k8s_api_url: self.k8s_api_url,
            k8s_token: self.k8s_token,
            k8s_ca_file: self.k8s_ca_file,
        }
        .normalized()
    }
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Process one event (`--event`, stdin by default) and print the handler response.
    Handle {
        #[clap(long, default_value = "-")]
        event: String,
    },
    /// Send a test alert to the configured Slack webhook.
    SlackTest,
    /// Send a non-incident system notification to Slack.
    NotifySystem {
        #[clap(long, default_value = "INFO", value_parser = ["INFO", "WARNING", "ERROR"])]
        level: String,
        message: String,
    },
}

fn main() -> ExitCode {
    let Cli {
        log,
        settings,
        command,
    } = Cli::parse();

    // JSON lines on stderr; stdout carries only the handler response.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(log.as_str())
        .json()
        .flatten_event(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .with_span_list(false)
        .with_target(false)
        .init();

    let config = settings.into_config();
    match command {
        Command::Handle { event } => {
            let response = match read_event(&event) {
                Ok(raw) => handle_event(raw, &config, &DefaultCredentialChain, &env_lookup),
                Err(e) => {
                    tracing::error!(error = %e.describe(), "failed to read event");
                    triage_handler::HandlerResponse::failed(&e)
                }
            };
            match serde_json::to_string(&response) {
                Ok(line) => println!("{line}"),
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode response");
                    return ExitCode::FAILURE;
                }
            }
            if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::SlackTest => slack_command(&config, |slack| slack.send_test_message()),
        Command::NotifySystem { level, message } => {
            slack_command(&config, |slack| slack.send_system_notification(&message, &level))
        }
    }
}

fn slack_command(
    config: &HandlerConfig,
    send: impl FnOnce(&SlackNotifier) -> Result<(), triage_core::error::AppError>,
) -> ExitCode {
    let result = SlackNotifier::new(config.slack_webhook_url.as_deref().unwrap_or_default())
        .and_then(|slack| send(&slack));
    match result {
        Ok(()) => {
            tracing::info!("slack message sent");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e.describe(), "slack message failed");
            ExitCode::FAILURE
        }
    }
}
