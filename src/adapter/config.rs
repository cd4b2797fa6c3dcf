//! Connection Profiles
//!
//! 接続プロファイル設定

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

/// PostgreSQL接続設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl DatabaseConfig {
    /// tokio-postgres の接続設定に変換する
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password);
        config
    }
}

fn default_poll_interval_secs() -> u64 {
    1
}

/// ウェアハウス接続設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset: String,
    pub location: String,
    pub import_bucket: String,
    pub export_bucket: String,
    pub service_account_key_path: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// 接続プロファイル
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    pub database: DatabaseConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
}

impl Profile {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let profile: Profile = serde_json::from_str(&content)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
            "database": {
                "host": "localhost",
                "port": 5432,
                "dbname": "analytics",
                "user": "loader",
                "password": "secret"
            },
            "warehouse": {
                "project_id": "test-project",
                "dataset": "staging",
                "location": "US",
                "import_bucket": "import-staging",
                "export_bucket": "export-staging",
                "service_account_key_path": "~/key.json"
            }
        }"#
    }

    #[test]
    fn test_profile_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let profile = Profile::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(profile.database.dbname, "analytics");
        assert_eq!(profile.warehouse.project_id, "test-project");
        // Defaults kick in for omitted fields
        assert_eq!(profile.warehouse.poll_interval_secs, 1);
        assert!(profile.slack_webhook_url.is_none());
    }

    #[test]
    fn test_to_pg_config() {
        let profile: Profile = serde_json::from_str(sample_json()).unwrap();
        let pg = profile.database.to_pg_config();
        assert_eq!(pg.get_dbname(), Some("analytics"));
        assert_eq!(pg.get_user(), Some("loader"));
        assert_eq!(pg.get_ports(), &[5432]);
    }
}
