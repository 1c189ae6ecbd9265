//! Minimal demonstration binary: runs a local scan of the given root and
//! prints the resulting scan report. Argument parsing, output formatting,
//! and every other CLI concern are deliberately left to a dedicated front
//! end; this just proves the core wires together end to end.

use disktree::config::Config;
use disktree::scanner::ScanSource;
use disktree::walker::local::LocalWalkerConfig;
use disktree::Core;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let root = match args.next() {
        Some(root) => root,
        None => {
            eprintln!("usage: disktree-scan <root>");
            std::process::exit(2);
        }
    };

    let config = Config::resolve();
    let core = match Core::open(config) {
        Ok(core) => core,
        Err(e) => {
            log::error!("failed to open catalog: {e}");
            std::process::exit(1);
        }
    };

    let walker_config = LocalWalkerConfig { root: root.clone(), ..Default::default() };
    match core.scanner.run(&root, ScanSource::Local(walker_config)) {
        Ok(report) => {
            println!(
                "scan {} complete in {:.2}s ({:.0} items/s, {} errors, {} byte blob)",
                report.scan_id, report.elapsed_secs, report.items_per_sec, report.error_count, report.blob_bytes
            );
        }
        Err(e) => {
            log::error!("scan failed: {e}");
            std::process::exit(1);
        }
    }
}
