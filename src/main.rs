use args::Args;
use getopts::Occur;
use glob::glob;
use leak_debug::Report;

const PROGRAM_DESC: &str = "Print leak_debug leak reports";
const PROGRAM_NAME: &str = "ld_print";

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let mut args = Args::new(PROGRAM_NAME, PROGRAM_DESC);
    args.option(
        "d",
        "dir",
        "Directory that stores leak reports",
        "DIR",
        Occur::Req,
        None,
    );
    args.option(
        "t",
        "threshold",
        "Fold call sites holding less than this percentage of leaked bytes",
        "PERCENT",
        Occur::Optional,
        Some(String::from("0")),
    );

    args.parse_from_cli()?;

    let dir: String = args.value_of("dir")?;
    let threshold: f64 = args.value_of("threshold")?;
    let wildcard = format!("{}/leak_debug.*.yaml", dir);

    let mut reports = vec![];

    for path in glob(wildcard.as_str())? {
        let path = path?;
        log::info!("found leak report in {}", path.display());
        reports.push(Report::read(&path)?);
    }

    if reports.is_empty() {
        anyhow::bail!("no leak reports in {}", dir);
    }

    // Aggregate per-process reports.
    let mut aggregate_report = Report::new();

    for report in reports.iter() {
        println!("Process {:?}:\n{}\n", report.processes, report);
        aggregate_report.merge(report);
    }

    let mut summary = String::new();
    aggregate_report.fmt_with_threshold(threshold, &mut summary)?;
    println!("Leaks by call site:\n{}", summary);

    Ok(())
}
