//! tests/validator_tests.rs
//! Pruebas de `MigrationValidator`.

#[cfg(test)]
mod tests {
    use crate::models::migration_model::ScriptType;
    use crate::services::validator_service::MigrationValidator;
    use crate::tests::support::{migrations_dir, write_script};

    #[test]
    fn parses_each_script_prefix() {
        assert_eq!(
            MigrationValidator::parse_script_filename("V001__create_users_table.sql"),
            Some((
                ScriptType::Migration,
                "001".to_string(),
                "create_users_table".to_string()
            ))
        );
        assert_eq!(
            MigrationValidator::parse_script_filename("R2.1__undo.sql").map(|p| p.0),
            Some(ScriptType::Rollback)
        );
        assert_eq!(
            MigrationValidator::parse_script_filename("S010__demo_data.sql").map(|p| p.0),
            Some(ScriptType::Seed)
        );
        assert!(MigrationValidator::parse_script_filename("001_create.sql").is_none());
        assert!(MigrationValidator::parse_script_filename("V001__create.txt").is_none());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let mut validator = MigrationValidator::new("/definitely/not/here");
        assert!(!validator.validate_directory_structure());
        assert_eq!(validator.errors.len(), 1);
        assert!(validator.errors[0].contains("does not exist"));
    }

    #[test]
    fn file_instead_of_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "V001__a.sql", "SELECT 1;");

        let mut validator = MigrationValidator::new(dir.path().join("V001__a.sql"));
        assert!(!validator.validate_directory_structure());
        assert!(validator.errors[0].contains("not a directory"));
    }

    #[test]
    fn empty_directory_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let mut validator = MigrationValidator::new(dir.path());

        assert!(validator.validate_directory_structure());
        assert!(validator.errors.is_empty());
        assert_eq!(
            validator.warnings,
            vec!["No .sql files found in migrations directory".to_string()]
        );
    }

    #[test]
    fn loads_scripts_sorted_by_filename() {
        let dir = migrations_dir();
        let mut validator = MigrationValidator::new(dir.path());

        assert!(validator.validate_directory_structure());
        let scripts = validator.load_scripts();

        let names: Vec<&str> = scripts.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["R001__drop_users.sql", "V001__create_users.sql", "V002__add_email.sql"]
        );
        assert_eq!(scripts[1].description, "create users");
        assert_eq!(scripts[1].version, "001");
        assert!(validator.errors.is_empty(), "{:?}", validator.errors);
        assert!(validator.warnings.is_empty(), "{:?}", validator.warnings);
    }

    #[test]
    fn unmatched_filenames_are_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "V001__ok.sql", "SELECT 1;");
        write_script(dir.path(), "random.sql", "SELECT 2;");
        write_script(dir.path(), "notes.txt", "ignored");

        let mut validator = MigrationValidator::new(dir.path());
        let scripts = validator.load_scripts();

        assert_eq!(scripts.len(), 1);
        assert_eq!(validator.warnings.len(), 1);
        assert!(validator.warnings[0].starts_with("random.sql: Filename doesn't match"));
    }

    #[test]
    fn content_checks() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "V001__empty.sql", "   \n ");
        write_script(dir.path(), "V002__no_semicolon.sql", "SELECT 1");
        write_script(dir.path(), "V003__drop.sql", "DROP TABLE users;");
        write_script(dir.path(), "V004__safe_drop.sql", "BEGIN;\nDROP TABLE old;\nCOMMIT;");

        let mut validator = MigrationValidator::new(dir.path());
        let scripts = validator.load_scripts();

        assert_eq!(scripts.len(), 4);
        assert_eq!(validator.errors, vec!["V001__empty.sql: Script is empty".to_string()]);
        assert!(validator
            .warnings
            .contains(&"V002__no_semicolon.sql: Missing semicolon at end of script".to_string()));
        assert!(validator
            .warnings
            .contains(&"V003__drop.sql: Dangerous operation without explicit transaction".to_string()));
        assert!(!validator.warnings.iter().any(|w| w.starts_with("V004")));
    }

    #[test]
    fn duplicate_versions_conflict_within_type_only() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "V001__a.sql", "SELECT 1;");
        write_script(dir.path(), "V001__b.sql", "SELECT 2;");
        write_script(dir.path(), "R001__a.sql", "SELECT 3;");

        let mut validator = MigrationValidator::new(dir.path());
        validator.load_scripts();

        assert_eq!(validator.errors.len(), 1);
        assert!(validator.errors[0].starts_with("Version conflict: V001__b.sql and V001__a.sql"));
    }

    #[test]
    fn report_lists_errors_and_warnings() {
        let mut validator = MigrationValidator::new("/tmp");
        validator.errors.push("boom".to_string());
        validator.warnings.push("careful".to_string());

        let report = validator.get_report();
        assert!(report.starts_with(&"=".repeat(60)));
        assert!(report.contains("MIGRATION VALIDATION REPORT"));
        assert!(report.contains("ERRORS (1):"));
        assert!(report.contains("❌ boom"));
        assert!(report.contains("WARNINGS (1):"));
        assert!(!report.contains("All validations passed"));

        let clean = MigrationValidator::new("/tmp").get_report();
        assert!(clean.contains("✅ All validations passed!"));
    }
}
