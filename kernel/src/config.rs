//! Engine configuration.
//!
//! Everything an engine needs to know about its session (the owning user, the warehouse bucket,
//! the catalog name) is captured in an [`EngineConfig`] that is handed to the engine when it is
//! constructed. Nothing is read from process-wide state.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::table::TableIdent;
use crate::utils::require;
use crate::{Error, HistoryResult};

/// Name of the session catalog that snapshot-capable tables are registered in.
pub const DEFAULT_CATALOG: &str = "spark_catalog";

const DEFAULT_FIRST_SNAPSHOT_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// The user owning the tables. User-owned databases are prefixed with this name.
    pub username: String,
    /// Root of the object store the tables live under, e.g. `s3a://bucket/`
    pub warehouse: Url,
    /// Catalog the migrated tables are registered in
    pub catalog: String,
    /// Snapshot id assigned to the first commit an engine makes
    pub first_snapshot_id: i64,
}

/// On-disk parameters file, e.g.
///
/// ```json
/// { "username": "alice", "s3BucketName": "cde-demo" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParametersFile {
    username: String,
    #[serde(alias = "bucketName", alias = "bucket")]
    s3_bucket_name: String,
    catalog: Option<String>,
    first_snapshot_id: Option<i64>,
}

impl EngineConfig {
    /// Create a config for `username` with the warehouse rooted at `s3a://<bucket_name>/`.
    pub fn new(username: impl Into<String>, bucket_name: impl AsRef<str>) -> HistoryResult<Self> {
        Self::builder(username, bucket_name).build()
    }

    pub fn builder(
        username: impl Into<String>,
        bucket_name: impl AsRef<str>,
    ) -> EngineConfigBuilder {
        EngineConfigBuilder::new(username, bucket_name)
    }

    /// Load a config from a JSON parameters file.
    pub fn from_file(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let params: ParametersFile = serde_json::from_reader(reader)?;
        Self::from_parameters(params)
    }

    /// Parse a config from the JSON contents of a parameters file.
    pub fn from_json_str(json: &str) -> HistoryResult<Self> {
        Self::from_parameters(serde_json::from_str(json)?)
    }

    fn from_parameters(params: ParametersFile) -> HistoryResult<Self> {
        let mut builder = Self::builder(params.username, params.s3_bucket_name);
        if let Some(catalog) = params.catalog {
            builder = builder.catalog(catalog);
        }
        if let Some(id) = params.first_snapshot_id {
            builder = builder.first_snapshot_id(id);
        }
        builder.build()
    }

    /// Qualify a user-owned table: `<username>_<database_suffix>.<table>`.
    pub fn table_ident(
        &self,
        database_suffix: impl AsRef<str>,
        table: impl Into<String>,
    ) -> HistoryResult<TableIdent> {
        TableIdent::try_new(
            format!("{}_{}", self.username, database_suffix.as_ref()),
            table,
        )
    }

    /// Storage location of a table under the warehouse: `<warehouse>/<namespace>/<name>/`.
    pub fn table_location(&self, table: &TableIdent) -> HistoryResult<Url> {
        Ok(self
            .warehouse
            .join(&format!("{}/{}/", table.namespace(), table.name()))?)
    }
}

pub struct EngineConfigBuilder {
    username: String,
    bucket_name: String,
    catalog: String,
    first_snapshot_id: i64,
}

impl EngineConfigBuilder {
    pub fn new(username: impl Into<String>, bucket_name: impl AsRef<str>) -> Self {
        Self {
            username: username.into(),
            bucket_name: bucket_name.as_ref().to_string(),
            catalog: DEFAULT_CATALOG.to_string(),
            first_snapshot_id: DEFAULT_FIRST_SNAPSHOT_ID,
        }
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self
    }

    pub fn first_snapshot_id(mut self, id: i64) -> Self {
        self.first_snapshot_id = id;
        self
    }

    pub fn build(self) -> HistoryResult<EngineConfig> {
        let username = self.username.trim().to_string();
        require!(
            !username.is_empty(),
            Error::InvalidConfig("username must not be empty".to_string())
        );
        let bucket = self
            .bucket_name
            .trim()
            .trim_start_matches("s3a://")
            .trim_start_matches("s3://")
            .trim_end_matches('/');
        require!(
            !bucket.is_empty() && !bucket.contains('/'),
            Error::InvalidConfig(format!("invalid bucket name: {:?}", self.bucket_name))
        );
        let warehouse = Url::parse(&format!("s3a://{bucket}/"))?;
        Ok(EngineConfig {
            username,
            warehouse,
            catalog: self.catalog,
            first_snapshot_id: self.first_snapshot_id,
        })
    }
}
