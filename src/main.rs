use cost_digest::CliError;

fn is_robot_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json" || arg == "--robot")
}

fn report_and_exit(err: CliError) -> ! {
    if is_robot_mode_args() {
        let payload = serde_json::json!({
            "error": {
                "code": err.code,
                "kind": err.kind,
                "message": err.message,
                "hint": err.hint,
                "retryable": err.retryable,
            }
        });
        eprintln!("{payload}");
    } else {
        eprintln!("error: {}", err.message);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {hint}");
        }
    }
    std::process::exit(err.code);
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let parsed = match cost_digest::parse_cli(raw_args) {
        Ok(parsed) => parsed,
        Err(err) => report_and_exit(err),
    };

    match cost_digest::run_with_parsed(parsed) {
        Ok(()) => Ok(()),
        Err(err) => report_and_exit(err),
    }
}
