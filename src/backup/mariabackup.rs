// mariadb-backup-s3/src/backup/mariabackup.rs
//! Command lines for the external tools, as handed to `bash -c`.
use std::path::Path;

use crate::config::MariaDbConfig;

/// Quotes `value` as one shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Physical copy of the running server into `target_dir`.
pub fn backup_command(db: &MariaDbConfig, parallel: usize, target_dir: &Path) -> String {
    format!(
        "{} --backup --parallel={} --target-dir={} --user={} --password={}",
        shell_quote(&db.backup_bin),
        parallel,
        quote_path(target_dir),
        shell_quote(&db.user),
        shell_quote(&db.password)
    )
}

/// Applies the redo log captured during the copy so the data files are
/// consistent on their own. Needs no credentials.
pub fn prepare_command(db: &MariaDbConfig, target_dir: &Path) -> String {
    format!(
        "{} --prepare --target-dir={}",
        shell_quote(&db.backup_bin),
        quote_path(target_dir)
    )
}

/// Archives the contents of `source_dir` and gzips them with pigz into
/// `archive`. `pipefail` makes a tar failure fail the whole stage.
pub fn compress_command(source_dir: &Path, archive: &Path) -> String {
    format!(
        "set -o pipefail; tar -cf - -C {} . | pigz > {}",
        quote_path(source_dir),
        quote_path(archive)
    )
}
