//! Environment and configuration checks.
//!
//! `ferry doctor` verifies the pieces a sync run depends on: the `p4`
//! and `git` binaries, a loadable configuration, a bound source client,
//! and a destination repository. Checks shell out directly rather than
//! going through the adapters so they can report on half-working setups
//! the adapters would refuse to open.

use std::path::Path;
use std::process::Command;

use crate::config::FerryConfig;
use crate::dest::{DestRepo as _, GitDest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Ok => "[OK]",
            Self::Warn => "[WARN]",
            Self::Fail => "[FAIL]",
        }
    }
}

struct DoctorCheck {
    status: CheckStatus,
    message: String,
    fix: Option<String>,
}

fn print_check(check: &DoctorCheck) {
    println!("{} {}", check.status.prefix(), check.message);
    if let Some(fix) = &check.fix {
        println!("       {fix}");
    }
}

/// Run every check and report. Returns whether all of them passed.
#[must_use]
pub fn run(config_path: &Path) -> bool {
    let mut checks = vec![check_p4(), check_git()];

    let loaded = FerryConfig::load(config_path);
    checks.push(check_config(config_path, &loaded));
    checks.push(check_client(loaded.as_ref().ok().map(|c| c.source.root.as_path())));
    checks.push(check_repository());

    let all_ok = checks.iter().all(|c| c.status == CheckStatus::Ok);

    println!("ferry doctor");
    println!("============");
    println!();
    for check in &checks {
        print_check(check);
    }
    println!();
    if all_ok {
        println!("All checks passed!");
    } else {
        println!("Some checks failed. See above for details.");
    }

    all_ok
}

fn check_p4() -> DoctorCheck {
    match Command::new("p4").arg("-V").output() {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let version = parse_p4_version(&stdout).unwrap_or("unknown version");
            DoctorCheck {
                status: CheckStatus::Ok,
                message: format!("p4: {version}"),
                fix: None,
            }
        }
        Ok(_) => DoctorCheck {
            status: CheckStatus::Fail,
            message: "p4: found but returned an error".to_string(),
            fix: Some("Install: https://www.perforce.com/downloads/helix-command-line-client-p4".to_string()),
        },
        Err(_) => DoctorCheck {
            status: CheckStatus::Fail,
            message: "p4: not found".to_string(),
            fix: Some("Install: https://www.perforce.com/downloads/helix-command-line-client-p4".to_string()),
        },
    }
}

fn check_git() -> DoctorCheck {
    match Command::new("git").arg("--version").output() {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let version = stdout.lines().next().unwrap_or("unknown").trim();
            DoctorCheck {
                status: CheckStatus::Ok,
                message: format!("git: {version}"),
                fix: None,
            }
        }
        Ok(_) => DoctorCheck {
            status: CheckStatus::Fail,
            message: "git: found but returned an error".to_string(),
            fix: Some("Install: https://git-scm.com/downloads".to_string()),
        },
        Err(_) => DoctorCheck {
            status: CheckStatus::Fail,
            message: "git: not found".to_string(),
            fix: Some("Install: https://git-scm.com/downloads".to_string()),
        },
    }
}

fn check_config(
    path: &Path,
    loaded: &Result<FerryConfig, crate::config::ConfigError>,
) -> DoctorCheck {
    let validated = loaded.as_ref().map_err(ToString::to_string).and_then(|c| {
        c.mapper()
            .map(|m| m.mappings().len())
            .map_err(|e| e.to_string())
    });
    match validated {
        Ok(count) => DoctorCheck {
            status: CheckStatus::Ok,
            message: format!("config: {} with {count} mapping(s)", path.display()),
            fix: None,
        },
        Err(message) => DoctorCheck {
            status: CheckStatus::Fail,
            message: format!("config: {message}"),
            fix: Some(format!("Edit {}", path.display())),
        },
    }
}

/// Confirm the source root is bound to a client workspace.
fn check_client(source_root: Option<&Path>) -> DoctorCheck {
    let Some(root) = source_root else {
        return DoctorCheck {
            status: CheckStatus::Ok,
            message: "source client: skipped (config not loaded)".to_string(),
            fix: None,
        };
    };

    let Ok(out) = Command::new("p4")
        .args(["-ztag", "info"])
        .current_dir(root)
        .output()
    else {
        return DoctorCheck {
            status: CheckStatus::Fail,
            message: format!("source client: cannot run p4 in {}", root.display()),
            fix: Some("Check [source] root in the config".to_string()),
        };
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return DoctorCheck {
            status: CheckStatus::Fail,
            message: format!(
                "source client: {}",
                stderr.lines().next().unwrap_or("p4 info failed")
            ),
            fix: None,
        };
    }

    classify_client(&String::from_utf8_lossy(&out.stdout), root)
}

/// Classify tagged `p4 info` output. An answering server with no bound
/// client is a warning rather than a failure: p4 itself works, only the
/// binding is missing.
fn classify_client(info: &str, root: &Path) -> DoctorCheck {
    match parse_info_field(info, "clientName") {
        Some(name) if name != "*unknown*" => {
            let client_root = parse_info_field(info, "clientRoot").unwrap_or("?");
            DoctorCheck {
                status: CheckStatus::Ok,
                message: format!("source client: {name} (root {client_root})"),
                fix: None,
            }
        }
        _ => DoctorCheck {
            status: CheckStatus::Warn,
            message: format!("source client: {} is not bound to a client", root.display()),
            fix: Some("Set P4CLIENT or add a .p4config under the source root".to_string()),
        },
    }
}

fn check_repository() -> DoctorCheck {
    match GitDest::open(Path::new(".")) {
        Ok(dest) => DoctorCheck {
            status: CheckStatus::Ok,
            message: format!("destination: git repository ({})", dest.git_dir().display()),
            fix: None,
        },
        Err(e) => DoctorCheck {
            status: CheckStatus::Fail,
            message: format!("destination: {e}"),
            fix: Some("Run ferry from the destination repository root".to_string()),
        },
    }
}

/// Pull the revision line out of `p4 -V` output; the first lines are
/// boilerplate.
fn parse_p4_version(output: &str) -> Option<&str> {
    output
        .lines()
        .find_map(|l| l.strip_prefix("Rev. "))
        .map(|v| v.trim().trim_end_matches('.'))
}

/// Read one `... field value` line from tagged p4 output.
fn parse_info_field<'a>(output: &'a str, field: &str) -> Option<&'a str> {
    let prefix = format!("... {field} ");
    output
        .lines()
        .find_map(|l| l.strip_prefix(prefix.as_str()))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p4_version_comes_from_the_rev_line() {
        let output = "Perforce - The Fast Software Configuration Management System.\n\
                      Copyright 1995-2023 Perforce Software.  All rights reserved.\n\
                      Rev. P4/LINUX26X86_64/2023.1/2441844 (2023/04/26).\n";
        assert_eq!(
            parse_p4_version(output),
            Some("P4/LINUX26X86_64/2023.1/2441844 (2023/04/26)")
        );
        assert_eq!(parse_p4_version("mystery output\n"), None);
    }

    #[test]
    fn info_fields_parse_from_tagged_output() {
        let output = "... userName alice\n... clientName ferry-ws\n... clientRoot /home/alice/ws\n";
        assert_eq!(parse_info_field(output, "clientName"), Some("ferry-ws"));
        assert_eq!(parse_info_field(output, "clientRoot"), Some("/home/alice/ws"));
        assert_eq!(parse_info_field(output, "serverAddress"), None);
    }

    #[test]
    fn bound_client_reads_ok() {
        let info = "... userName alice\n... clientName ferry-ws\n... clientRoot /home/alice/ws\n";
        let check = classify_client(info, Path::new("/home/alice/ws"));
        assert_eq!(check.status, CheckStatus::Ok);
        assert!(check.message.contains("ferry-ws"));
    }

    #[test]
    fn unbound_directory_warns_instead_of_failing() {
        let info = "... userName alice\n... clientName *unknown*\n";
        let check = classify_client(info, Path::new("/src/ws"));
        assert_eq!(check.status, CheckStatus::Warn);
        assert!(check.message.contains("not bound"));
        assert!(check.fix.is_some());
    }
}
