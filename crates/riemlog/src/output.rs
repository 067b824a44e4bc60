use owo_colors::OwoColorize;
use riemlog_core::config::Config;
use riemlog_core::severity::Severity;
use riemlog_forward::{Ack, ForwardOutcome};

pub fn print_config_human(cfg: &Config) {
    println!("service:        {}", cfg.service_name.cyan());
    println!("hostname:       {}", cfg.hostname);
    println!(
        "collector:      {} ({})",
        cfg.collector_addr(),
        cfg.transport
    );
    println!("min severity:   {}", severity_label(cfg.minimum_severity));
    println!("max attempts:   {}", cfg.max_attempts);
    println!(
        "timeouts:       connect={:?} io={:?}",
        cfg.connect_timeout, cfg.io_timeout
    );
    println!("debug:          {}", cfg.debug);
    if cfg.custom_attributes.is_empty() {
        println!("custom attrs:   -");
    } else {
        let attrs = cfg
            .custom_attributes
            .iter()
            .map(|(k, v)| format!("log/{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("custom attrs:   {attrs}");
    }
}

pub fn print_outcome_human(outcome: &ForwardOutcome) {
    match outcome {
        ForwardOutcome::Filtered => println!("{} below minimum severity", "skipped".yellow()),
        ForwardOutcome::NotRunning => println!("{} forwarder not running", "skipped".yellow()),
        ForwardOutcome::Delivered(Ack::Unacknowledged) => {
            println!("{} (udp, no acknowledgement)", "sent".green())
        }
        ForwardOutcome::Delivered(Ack::Acknowledged { .. }) => {
            println!("{} acknowledged by collector", "delivered".green())
        }
    }
}

pub fn outcome_label(outcome: &ForwardOutcome) -> &'static str {
    match outcome {
        ForwardOutcome::Filtered => "filtered",
        ForwardOutcome::NotRunning => "not_running",
        ForwardOutcome::Delivered(Ack::Unacknowledged) => "sent",
        ForwardOutcome::Delivered(Ack::Acknowledged { .. }) => "acknowledged",
    }
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Trace => severity.as_str().blue().to_string(),
        Severity::Debug => severity.as_str().bright_black().to_string(),
        Severity::Info => severity.as_str().green().to_string(),
        Severity::Warn => severity.as_str().yellow().to_string(),
        Severity::Error => severity.as_str().red().to_string(),
    }
}
