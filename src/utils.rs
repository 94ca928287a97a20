use time::macros::format_description;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

pub fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let timer = LocalTime::new(format_description!("[hour]:[minute]:[second]"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .init();
}

pub fn format_number(num: u64) -> String {
    num.to_string()
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn validate_args(args: &crate::args::Args) -> anyhow::Result<()> {
    if args.top == 0 {
        anyhow::bail!("--top must be greater than 0");
    }

    match (&args.sites, &args.analyze) {
        (None, None) => anyhow::bail!("Nothing to do: pass --sites to scan or --analyze for saved results"),
        (Some(_), Some(_)) => anyhow::bail!("--sites and --analyze are mutually exclusive"),
        _ => Ok(()),
    }
}
