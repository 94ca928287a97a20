use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use trackscope::args::Args;
use trackscope::scan::CaptureDirCollector;
use trackscope::{cache, normalize, scan, stats, utils};
use trackscope::{TrackerIndex, TrackerRegistry};

fn run(args: &Args) -> Result<()> {
    let (results, source_file) = if let Some(saved_path) = &args.analyze {
        let results = scan::load_results(saved_path)?;
        (results, Some(saved_path.to_string_lossy().into_owned()))
    } else {
        let Some(sites_path) = args.sites.as_ref() else {
            anyhow::bail!("Nothing to do: pass --sites to scan or --analyze for saved results");
        };
        let registry = TrackerRegistry::load(&args.registry)?;
        if registry.is_empty() {
            warn!(
                action = "degrade",
                component = "run",
                "Tracker registry is empty, no resources will match"
            );
        }
        let index = TrackerIndex::build(&registry);

        let sites = scan::load_sites(sites_path)?;
        let collector = CaptureDirCollector::new(&args.captures);
        let ledger = if args.no_cache {
            Vec::new()
        } else {
            cache::load_ledger(&args.cache)
        };
        let cache_path = (!args.no_cache).then_some(args.cache.as_path());

        let (results, _) = scan::scan_sites(&sites, &collector, &index, &registry, ledger, cache_path);
        (results, None)
    };

    let dataset = normalize::normalize_results(&results, source_file.as_deref());
    normalize::save_dataset(&args.output, &dataset)?;
    info!(action = "saved", component = "run", path = ?args.output, "Normalized dataset written");

    let report = stats::aggregate(&dataset)?;
    if let Some(report_path) = &args.report {
        stats::save_report(report_path, &report)?;
        info!(action = "saved", component = "run", path = ?report_path, "Analytics report written");
    }
    stats::print_report(&report, args.top);

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);
    utils::validate_args(&args)?;

    match run(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
