//! Local filesystem walker: shells out to a `find`-equivalent enumerator
//! and reads its output as NUL-terminated records, because file names may
//! legally contain newlines.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use memchr::memchr_iter;
use regex::Regex;

use super::{ErrorCollector, WalkRecord};
use crate::entry::EntryKind;
use crate::error::WalkerError;

/// Mount points that block on network I/O and must never be descended into.
const EXCLUDED_PREFIXES: &[&str] = &[
    "/System/Volumes/Data/",
    "/System/Volumes/VM/",
    "/System/Volumes/Preboot/",
    "/System/Volumes/Update/",
    "/System/Volumes/xarts/",
    "/System/Volumes/iSCPreboot/",
    "/System/Volumes/Hardware/",
    "/Volumes/",
];

pub fn default_exclusions() -> Vec<String> {
    EXCLUDED_PREFIXES.iter().map(|s| (*s).to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct LocalWalkerConfig {
    pub root: String,
    pub exclusions: Vec<String>,
    pub sudo: bool,
}

impl Default for LocalWalkerConfig {
    fn default() -> Self {
        LocalWalkerConfig {
            root: "/".to_string(),
            exclusions: default_exclusions(),
            sudo: false,
        }
    }
}

pub struct LocalWalkResult {
    pub records: Vec<WalkRecord>,
    pub errors: ErrorCollector,
}

/// Runs the enumerator to completion and collects every record.
pub fn walk(config: &LocalWalkerConfig) -> Result<LocalWalkResult, WalkerError> {
    let mut cmd = build_command(config);

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| WalkerError::SpawnFailed(e.to_string()))?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let errors = Arc::new(Mutex::new(ErrorCollector::new()));
    let errors_for_thread = Arc::clone(&errors);

    // Read stderr on its own thread so a full stdout pipe and a full stderr
    // pipe can never deadlock each other.
    let stderr_handle = thread::Builder::new()
        .name("disktree-walker-stderr".into())
        .spawn(move || read_stderr(stderr, &errors_for_thread))
        .map_err(|e| WalkerError::SpawnFailed(e.to_string()))?;

    let records = read_stdout(stdout, &config.root)?;

    stderr_handle.join().expect("stderr reader thread panicked");
    let status = child.wait()?;

    let errors = Arc::try_unwrap(errors).expect("stderr thread finished").into_inner().unwrap();

    if !status.success() && errors.is_empty() {
        log::warn!("local walker enumerator exited with {status} and no permission errors captured");
        return Err(WalkerError::SpawnFailed(format!("enumerator exited with {status}")));
    }

    Ok(LocalWalkResult { records, errors })
}

fn build_command(config: &LocalWalkerConfig) -> Command {
    let mut args: Vec<String> = vec![config.root.clone(), "-mindepth".into(), "0".into()];

    // Exclusions are pruned, not filtered after the fact: `-path ... -prune`
    // stops find from ever calling readdir/stat on the matched subtree, which
    // matters because these are virtual/network mounts that block on I/O.
    if !config.exclusions.is_empty() {
        args.push("(".into());
        for (i, prefix) in config.exclusions.iter().enumerate() {
            if i > 0 {
                args.push("-o".into());
            }
            args.push("-path".into());
            args.push(prefix.trim_end_matches('/').to_string());
        }
        args.push(")".into());
        args.push("-prune".into());
        args.push("-o".into());
    }

    args.push("-printf".into());
    args.push("%y %b %T@ %p\\0".into());

    if config.sudo {
        let mut cmd = Command::new("sudo");
        cmd.arg("find").args(args);
        cmd
    } else {
        let mut cmd = Command::new("find");
        cmd.args(args);
        cmd
    }
}

fn read_stdout(mut stdout: impl Read, root: &str) -> Result<Vec<WalkRecord>, WalkerError> {
    let mut buf = Vec::new();
    stdout.read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut start = 0;
    for nul_pos in memchr_iter(0, &buf) {
        let record = &buf[start..nul_pos];
        start = nul_pos + 1;
        if record.is_empty() {
            continue;
        }
        if let Some(rec) = parse_record(record, root) {
            records.push(rec);
        }
    }
    Ok(records)
}

/// Parses one `<type> <blocks> <mtime> <path>` record. Returns `None` for
/// unrecognized types or paths that fall outside `root` (defensive; the
/// enumerator should never emit these).
fn parse_record(record: &[u8], root: &str) -> Option<WalkRecord> {
    let text = String::from_utf8_lossy(record);
    let mut parts = text.splitn(4, ' ');
    let kind_str = parts.next()?;
    let blocks_str = parts.next()?;
    let mtime_str = parts.next()?;
    let path = parts.next()?;

    let kind = match kind_str {
        "f" => EntryKind::File,
        "d" => EntryKind::Dir,
        _ => return None,
    };

    if !path.starts_with(root) {
        return None;
    }

    let blocks: u64 = blocks_str.parse().ok()?;
    let mtime: f64 = mtime_str.parse().ok()?;
    let size = blocks * 512;

    Some(WalkRecord {
        uri: path.to_string(),
        kind,
        size,
        mtime,
    })
}

fn read_stderr(mut stderr: impl Read, errors: &Arc<Mutex<ErrorCollector>>) {
    let denied_re = Regex::new(r"(?i)permission denied.*?['\u{2018}]([^'\u{2019}]+)['\u{2019}]").unwrap();

    let mut text = String::new();
    if stderr.read_to_string(&mut text).is_err() {
        return;
    }

    for line in text.lines() {
        if let Some(caps) = denied_re.captures(line) {
            let path = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            errors.lock().unwrap().record(path);
        } else if !line.is_empty() {
            log::debug!("local walker stderr: {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_record_skips_unknown_kind() {
        assert!(parse_record(b"l 0 0 /root/symlink", "/root").is_none());
    }

    #[test]
    fn parse_record_parses_file() {
        let rec = parse_record(b"f 8 1700000000.0 /root/a.txt", "/root").unwrap();
        assert_eq!(rec.uri, "/root/a.txt");
        assert_eq!(rec.kind, EntryKind::File);
        assert_eq!(rec.size, 4096);
    }

    #[test]
    fn parse_record_rejects_outside_root() {
        assert!(parse_record(b"f 1 0 /other/a.txt", "/root").is_none());
    }

    #[test]
    fn default_exclusions_nonempty() {
        assert!(!default_exclusions().is_empty());
    }

    #[test]
    fn build_command_prunes_exclusions_instead_of_filtering() {
        let config = LocalWalkerConfig {
            root: "/".into(),
            exclusions: vec!["/Volumes/".into(), "/System/Volumes/Data/".into()],
            sudo: false,
        };
        let cmd = build_command(&config);
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();

        let prune_pos = args.iter().position(|a| a == "-prune").expect("-prune must be present");
        assert_eq!(args[prune_pos + 1], "-o");
        assert!(args.contains(&"/Volumes".to_string()));
        assert!(args.contains(&"/System/Volumes/Data".to_string()));
        // never filtered post hoc with -not
        assert!(!args.iter().any(|a| a == "-not"));
    }

    #[test]
    fn build_command_without_exclusions_has_no_prune() {
        let config = LocalWalkerConfig { root: "/t".into(), exclusions: vec![], sudo: false };
        let cmd = build_command(&config);
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert!(!args.contains(&"-prune".to_string()));
    }
}
