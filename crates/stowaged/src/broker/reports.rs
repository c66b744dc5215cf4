//! Administrative reports: maintenance, usage statistics and the command
//! catalogue.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use stowage_sandbox::{Access, CommandPolicy, is_available};

use super::{BROKER_TARGET, Broker, BrokerResult, Caller, Outcome, REPOSITORY_DIR};
use crate::zones::Zone;
use crate::zones::fsops::usage;
use crate::zones::maintenance::MaintenanceReport;

const MIB: u64 = 1024 * 1024;

/// Size and file count of one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZoneUsage {
    /// Bytes held in regular files.
    pub size_bytes: u64,
    /// Number of regular files.
    pub files: u64,
}

/// Usage summed over every zone, against the informational quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalUsage {
    /// Bytes held in regular files.
    pub size_bytes: u64,
    /// Number of regular files.
    pub files: u64,
    /// Configured per-user quota in MiB.
    pub quota_mb: u64,
    /// Share of the quota in use, with one decimal, e.g. `12.5%`.
    pub usage_percent: String,
}

/// Result of `stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    /// Every conversation's uploads.
    pub uploads: ZoneUsage,
    /// Storage data tree.
    pub storage: ZoneUsage,
    /// Documents data tree, without repository metadata.
    pub documents: ZoneUsage,
    /// Sum of the three.
    pub total: TotalUsage,
}

/// Availability of one zone's whitelist on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneCommands {
    /// `read_only` or `read_write`.
    pub access: &'static str,
    /// Whitelisted commands found on `PATH`.
    pub available: Vec<String>,
    /// Whitelisted commands not installed.
    pub missing: Vec<String>,
}

/// The git sub-policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitCommands {
    /// Subcommands allowed in every writable zone for inspection.
    pub read: Vec<String>,
    /// Subcommands that change the working tree or history.
    pub write: Vec<String>,
    /// Subcommands refused everywhere.
    pub forbidden: Vec<String>,
}

/// Totals over the union of all whitelists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    /// Distinct whitelisted commands.
    pub total_whitelist: usize,
    /// Of those, installed.
    pub available: usize,
    /// Of those, missing.
    pub missing: usize,
    /// Installed share, e.g. `87.5%`.
    pub coverage: String,
}

/// Result of `allowed_commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedCommandsReport {
    /// Read-only toolbox.
    pub uploads: ZoneCommands,
    /// Read-write toolbox.
    pub storage: ZoneCommands,
    /// Read-write toolbox, with the repository.
    pub documents: ZoneCommands,
    /// Git sub-policy.
    pub git: GitCommands,
    /// Commands refused in every zone.
    pub blacklist: Vec<String>,
    /// Availability totals.
    pub summary: CommandSummary,
}

impl AllowedCommandsReport {
    /// Looks up every whitelisted command of `policy` on `PATH`.
    #[must_use]
    pub fn detect(policy: &CommandPolicy) -> Self {
        let read_only = zone_commands(policy, Access::ReadOnly);
        let read_write = zone_commands(policy, Access::ReadWrite);

        let every: BTreeSet<&String> = policy
            .whitelist(Access::ReadOnly)
            .iter()
            .chain(policy.whitelist(Access::ReadWrite))
            .collect();
        let installed = read_only
            .available
            .iter()
            .chain(&read_write.available)
            .collect::<BTreeSet<_>>()
            .len();
        let total = every.len();

        Self {
            uploads: read_only,
            storage: read_write.clone(),
            documents: read_write,
            git: GitCommands {
                read: sorted(policy.git_read()),
                write: sorted(policy.git_write()),
                forbidden: sorted(policy.git_forbidden()),
            },
            blacklist: sorted(policy.blacklist()),
            summary: CommandSummary {
                total_whitelist: total,
                available: installed,
                missing: total.saturating_sub(installed),
                coverage: percent(
                    u64::try_from(installed).unwrap_or(u64::MAX),
                    u64::try_from(total).unwrap_or(u64::MAX),
                ),
            },
        }
    }
}

impl Broker {
    /// Sweeps expired and corrupted locks and orphaned edit copies in the
    /// caller's Storage and Documents zones.
    ///
    /// # Errors
    ///
    /// Returns [`super::BrokerError`] when a sweep cannot list or remove
    /// entries.
    pub fn maintenance(&self, caller: &Caller) -> BrokerResult<MaintenanceReport> {
        let expiry = self.expiry();
        let user_root = self.user_root(caller);
        let mut report = MaintenanceReport::default();
        for zone in Zone::EDITABLE {
            report.absorb(user_root.zone(zone).sweep(expiry)?);
        }
        info!(
            target: BROKER_TARGET,
            user = %caller.user,
            cleaned = report.total(),
            "maintenance finished"
        );
        Ok(Outcome::new(
            format!("Maintenance complete: {} element(s) cleaned", report.total()),
            report,
        ))
    }

    /// Measures the caller's zones. Missing zones measure as empty.
    #[must_use]
    pub fn stats(&self, caller: &Caller) -> Outcome<StatsReport> {
        let user_root = self.user_root(caller);
        let measure = |zone: Zone, excluded: &[&str]| {
            let layout = user_root.zone(zone);
            let root = if zone.is_editable() {
                layout.data_dir()
            } else {
                layout.base().to_path_buf()
            };
            let measured = usage(&root, excluded);
            ZoneUsage {
                size_bytes: measured.bytes,
                files: measured.files,
            }
        };
        let uploads = measure(Zone::Uploads, &[]);
        let storage = measure(Zone::Storage, &[]);
        let documents = measure(Zone::Documents, &[REPOSITORY_DIR]);

        let size_bytes = uploads.size_bytes + storage.size_bytes + documents.size_bytes;
        let quota_bytes = self.limits.quota_bytes();
        let total = TotalUsage {
            size_bytes,
            files: uploads.files + storage.files + documents.files,
            quota_mb: quota_bytes.checked_div(MIB).unwrap_or(0),
            usage_percent: percent(size_bytes, quota_bytes),
        };
        Outcome::silent(StatsReport {
            uploads,
            storage,
            documents,
            total,
        })
    }

    /// Lists the whitelists, the git sub-policy and the blacklist, with
    /// each whitelisted command flagged as installed or missing. The host
    /// is looked up once per broker.
    #[must_use]
    pub fn allowed_commands(&self) -> Outcome<AllowedCommandsReport> {
        let report = self
            .availability
            .get_or_init(|| AllowedCommandsReport::detect(&self.policy));
        Outcome::silent(report.clone())
    }
}

fn zone_commands(policy: &CommandPolicy, access: Access) -> ZoneCommands {
    let (available, missing): (Vec<String>, Vec<String>) = policy
        .whitelist(access)
        .iter()
        .cloned()
        .partition(|command| is_available(command));
    ZoneCommands {
        access: if access.is_read_only() {
            "read_only"
        } else {
            "read_write"
        },
        available,
        missing,
    }
}

fn sorted(set: &BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

/// `part` as a share of `whole`, with one decimal and a percent sign.
fn percent(part: u64, whole: u64) -> String {
    let tenths = part.saturating_mul(1000).checked_div(whole).unwrap_or(0);
    let units = tenths.checked_div(10).unwrap_or(0);
    let decimal = tenths.checked_rem(10).unwrap_or(0);
    format!("{units}.{decimal}%")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 1000, "0.0%")]
    #[case(125, 1000, "12.5%")]
    #[case(1, 3, "33.3%")]
    #[case(5, 0, "0.0%")]
    fn percentages_keep_one_decimal(#[case] part: u64, #[case] whole: u64, #[case] expected: &str) {
        assert_eq!(percent(part, whole), expected);
    }

    #[test]
    fn catalogue_partitions_every_whitelisted_command() {
        let policy = CommandPolicy::new();
        let report = AllowedCommandsReport::detect(&policy);
        assert_eq!(
            report.uploads.available.len() + report.uploads.missing.len(),
            policy.whitelist(Access::ReadOnly).len()
        );
        assert_eq!(report.storage, report.documents);
        assert!(report.blacklist.iter().any(|command| command == "bash"));
        assert!(report.git.forbidden.iter().any(|command| command == "push"));
        assert_eq!(
            report.summary.available + report.summary.missing,
            report.summary.total_whitelist
        );
    }
}
