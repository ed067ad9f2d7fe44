//! services/validator_service.rs
//! Valida la estructura del directorio de migraciones y el contenido de los scripts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::models::migration_model::{MigrationScript, ScriptType};

const REPORT_RULE_WIDTH: usize = 60;
const DANGEROUS_OPS: [&str; 3] = ["drop table", "drop database", "truncate"];

// Ej: V001__create_users_table.sql
fn migration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^V(\d*.\d*)__(.*)\.sql$").expect("regex válida"))
}

fn rollback_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^R(\d*.\d*)__(.*)\.sql$").expect("regex válida"))
}

fn seed_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^S(\d*.\d*)__(.*)\.sql$").expect("regex válida"))
}

/// Acumula errores y warnings mientras valida un directorio.
#[derive(Debug, Clone)]
pub struct MigrationValidator {
    migrations_dir: PathBuf,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MigrationValidator {
    pub fn new(migrations_dir: impl AsRef<Path>) -> Self {
        MigrationValidator {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
            errors: vec![],
            warnings: vec![],
        }
    }

    /// Verifica que el directorio exista y sea directorio.
    pub fn validate_directory_structure(&mut self) -> bool {
        if !self.migrations_dir.exists() {
            self.errors.push(format!(
                "Migrations directory does not exist: {}",
                self.migrations_dir.display()
            ));
            return false;
        }

        if !self.migrations_dir.is_dir() {
            self.errors.push(format!(
                "Migrations directory is not a directory: {}",
                self.migrations_dir.display()
            ));
            return false;
        }

        match self.sql_files() {
            Ok(files) if files.is_empty() => self
                .warnings
                .push("No .sql files found in migrations directory".to_string()),
            Ok(_) => {}
            Err(e) => self.errors.push(format!(
                "Failed to read migrations directory {}: {}",
                self.migrations_dir.display(),
                e
            )),
        }

        self.errors.is_empty()
    }

    /// Devuelve (tipo, versión, descripción) o None si no sigue ningún patrón.
    pub fn parse_script_filename(filename: &str) -> Option<(ScriptType, String, String)> {
        let candidates = [
            (ScriptType::Migration, migration_pattern()),
            (ScriptType::Rollback, rollback_pattern()),
            (ScriptType::Seed, seed_pattern()),
        ];

        candidates.iter().find_map(|(script_type, re)| {
            re.captures(filename)
                .map(|caps| (*script_type, caps[1].to_string(), caps[2].to_string()))
        })
    }

    /// Revisa el contenido del script. Solo el script vacío es error.
    pub fn validate_script_content(&mut self, script: &MigrationScript) -> bool {
        let mut is_valid = true;
        let trimmed = script.content.trim();

        if trimmed.is_empty() {
            self.errors
                .push(format!("{}: Script is empty", script.filename));
            is_valid = false;
        }

        if !trimmed.ends_with(';') {
            self.warnings.push(format!(
                "{}: Missing semicolon at end of script",
                script.filename
            ));
        }

        let content_lower = script.content.to_lowercase();
        if DANGEROUS_OPS.iter().any(|op| content_lower.contains(op))
            && (!content_lower.contains("begin") || !content_lower.contains("commit"))
        {
            self.warnings.push(format!(
                "{}: Dangerous operation without explicit transaction",
                script.filename
            ));
        }

        is_valid
    }

    /// Carga y valida todos los scripts `*.sql`, ordenados por nombre.
    pub fn load_scripts(&mut self) -> Vec<MigrationScript> {
        log::info!("Loading migration scripts from {}", self.migrations_dir.display());

        let files = match self.sql_files() {
            Ok(files) => files,
            Err(e) => {
                self.errors.push(format!(
                    "Failed to read migrations directory {}: {}",
                    self.migrations_dir.display(),
                    e
                ));
                return vec![];
            }
        };

        let mut scripts = vec![];
        for path in files {
            let filename = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            log::debug!("Found script: {}", filename);

            let Some((script_type, version, description)) =
                Self::parse_script_filename(&filename)
            else {
                self.warnings.push(format!(
                    "{}: Filename doesn't match expected pattern \
                     (V###__description.sql, R###__description.sql, or S###__description.sql)",
                    filename
                ));
                continue;
            };

            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    self.errors
                        .push(format!("{}: Failed to read file: {}", filename, e));
                    continue;
                }
            };

            let script = MigrationScript {
                filename,
                filepath: path,
                version,
                description: description.replace('_', " "),
                script_type,
                content,
            };

            self.validate_script_content(&script);
            scripts.push(script);
        }

        self.check_version_conflicts(&scripts);
        scripts
    }

    /// Dos scripts del mismo tipo con la misma versión son conflicto.
    fn check_version_conflicts(&mut self, scripts: &[MigrationScript]) {
        let mut seen: HashMap<(ScriptType, &str), &str> = HashMap::new();

        for script in scripts {
            let key = (script.script_type, script.version.as_str());
            match seen.get(&key) {
                Some(previous) => self.errors.push(format!(
                    "Version conflict: {} and {} both use version {}",
                    script.filename, previous, script.version
                )),
                None => {
                    seen.insert(key, &script.filename);
                }
            }
        }
    }

    pub fn get_report(&self) -> String {
        let rule = "=".repeat(REPORT_RULE_WIDTH);
        let mut report = vec![
            rule.clone(),
            "MIGRATION VALIDATION REPORT".to_string(),
            rule.clone(),
        ];

        if !self.errors.is_empty() {
            report.push(format!("\nERRORS ({}):", self.errors.len()));
            for error in &self.errors {
                report.push(format!("  ❌ {}", error));
            }
        }

        if !self.warnings.is_empty() {
            report.push(format!("\nWARNINGS ({}):", self.warnings.len()));
            for warning in &self.warnings {
                report.push(format!("  ⚠️  {}", warning));
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            report.push("\n✅ All validations passed!".to_string());
        }

        report.push(rule);
        report.join("\n")
    }

    fn sql_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.migrations_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().map(|e| e == "sql").unwrap_or(false))
            .collect();
        files.sort();
        Ok(files)
    }
}
