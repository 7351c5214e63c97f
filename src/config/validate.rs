// src/config/validate.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile, WorkerConfig, WorkerSection};
use crate::errors::{Result, WorkerwatchError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WorkerwatchError;

    /// Validate with relative paths kept relative to the current directory.
    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        raw.validate_in(Path::new("."))
    }
}

impl RawConfigFile {
    /// Validate and resolve relative paths against `base_dir`.
    pub fn validate_in(self, base_dir: &Path) -> Result<ConfigFile> {
        let worker = validate_worker(&self.worker, base_dir)?;
        validate_hooks(&self)?;
        Ok(ConfigFile::new_unchecked(worker, self.credentials, self.hooks))
    }
}

fn validate_worker(section: &WorkerSection, base_dir: &Path) -> Result<WorkerConfig> {
    let program = section.program.trim();
    if program.is_empty() {
        return Err(WorkerwatchError::ConfigError(
            "[worker].program must not be empty".to_string(),
        ));
    }
    if section.script.as_os_str().is_empty() {
        return Err(WorkerwatchError::ConfigError(
            "[worker].script must not be empty".to_string(),
        ));
    }

    let cancel_grace = parse_duration(&section.cancel_grace).map_err(|e| {
        WorkerwatchError::ConfigError(format!("[worker].cancel_grace: {e}"))
    })?;

    let script = resolve_path(base_dir, &section.script);
    let working_dir = match &section.working_dir {
        Some(dir) => resolve_path(base_dir, dir),
        None => script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.to_path_buf()),
    };

    for key in section.env.keys() {
        if key.is_empty() || key.contains('=') {
            return Err(WorkerwatchError::ConfigError(format!(
                "[worker.env] has invalid variable name '{key}'"
            )));
        }
    }

    Ok(WorkerConfig {
        program: resolve_program(base_dir, program),
        script,
        working_dir,
        output_dir: resolve_path(base_dir, &section.output_dir),
        extra_args: section.extra_args.clone(),
        env: section.env.clone(),
        cancel_grace,
    })
}

fn validate_hooks(cfg: &RawConfigFile) -> Result<()> {
    if let Some(args) = &cfg.hooks.cleanup_on_exit {
        if args.is_empty() {
            return Err(WorkerwatchError::ConfigError(
                "[hooks].cleanup_on_exit must not be an empty list (omit it instead)".to_string(),
            ));
        }
    }
    Ok(())
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Bare executable names stay as-is for `PATH` lookup.
fn resolve_program(base_dir: &Path, program: &str) -> String {
    let has_separator = program.contains('/') || program.contains('\\');
    if has_separator && Path::new(program).is_relative() {
        base_dir.join(program).to_string_lossy().into_owned()
    } else {
        program.to_string()
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).expect("test TOML must parse")
    }

    #[test]
    fn resolves_paths_against_base_dir() {
        let cfg = raw(
            r#"
[worker]
program = "python3"
script = "backend/main.py"
"#,
        )
        .validate_in(Path::new("/srv/app"))
        .unwrap();

        assert_eq!(cfg.worker.program, "python3");
        assert_eq!(cfg.worker.script, PathBuf::from("/srv/app/backend/main.py"));
        assert_eq!(cfg.worker.working_dir, PathBuf::from("/srv/app/backend"));
        assert_eq!(cfg.worker.output_dir, PathBuf::from("/srv/app/output"));
        assert_eq!(cfg.worker.cancel_grace, Duration::from_secs(5));
        assert!(cfg.credentials.api_key.is_none());
    }

    #[test]
    fn relative_program_with_separator_is_resolved() {
        let cfg = raw(
            r#"
[worker]
program = "venv/bin/python"
script = "/opt/worker/main.py"
working_dir = "/tmp"
cancel_grace = "250ms"
"#,
        )
        .validate_in(Path::new("/srv/app"))
        .unwrap();

        assert_eq!(cfg.worker.program, "/srv/app/venv/bin/python");
        assert_eq!(cfg.worker.working_dir, PathBuf::from("/tmp"));
        assert_eq!(cfg.worker.cancel_grace, Duration::from_millis(250));
    }

    #[test]
    fn rejects_empty_program_and_bad_grace() {
        let err = ConfigFile::try_from(raw(
            r#"
[worker]
program = "  "
script = "main.py"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, WorkerwatchError::ConfigError(msg) if msg.contains("program")));

        let err = ConfigFile::try_from(raw(
            r#"
[worker]
program = "python3"
script = "main.py"
cancel_grace = "soon"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, WorkerwatchError::ConfigError(msg) if msg.contains("cancel_grace")));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_grace_is_a_config_error() {
        assert!(parse_duration("307445734561825861h").is_err());
        assert!(parse_duration("18446744073709551615m").is_err());

        let err = ConfigFile::try_from(raw(
            r#"
[worker]
program = "python3"
script = "main.py"
cancel_grace = "307445734561825861h"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, WorkerwatchError::ConfigError(msg) if msg.contains("too large")));
    }
}
