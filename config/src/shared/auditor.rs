use serde::{Deserialize, Serialize};

use crate::shared::{AuditConfig, PgConnectionConfig, ValidationError};

/// Top-level configuration for an audit run.
///
/// Describes the two endpoints being compared, the table under audit, and the
/// tuning knobs. This is the shape loaded from the `configuration/` directory
/// when the CLI is not given explicit connection strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditorConfig {
    /// Connection settings for the primary database.
    pub primary: PgConnectionConfig,
    /// Connection settings for the read replica.
    pub replica: PgConnectionConfig,
    /// Name of the table to audit.
    pub table: String,
    /// Schema containing the table.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Audit tuning knobs.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AuditorConfig {
    /// Validates the full auditor configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.primary.tls.validate()?;
        self.replica.tls.validate()?;
        self.audit.validate()?;

        if self.table.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "table".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn default_schema() -> String {
    "public".to_string()
}
