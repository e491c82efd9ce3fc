//! MySQL / MariaDB data source over `sqlx`

use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info};

use crate::config::{ClientOptions, SourceConfig};
use crate::error::Result;
use crate::scan::{LinkRow, Window};

use super::{Connector, DataSource, RowCursor};

/// Upper bound of the page_id space
pub const MAX_PAGE_ID_SQL: &str = "SELECT MAX(page_id) FROM page";

/// Category links into one page_id window
///
/// The window bounds sit in the join condition together with the
/// namespace and title match; the result equals the plain filtered join
/// ordered by page_id.
pub const WINDOW_SQL: &str = "SELECT /* SLOW_OK */ cl_from, page_id, cl_type \
     FROM categorylinks \
     JOIN page ON page_id >= ? AND page_id < ? \
       AND page_namespace = 14 \
       AND page_title = cl_to \
     WHERE cl_type != 'page' \
     ORDER BY page_id";

/// Port used when neither configuration nor the option file sets one
pub const DEFAULT_PORT: u16 = 3306;

/// Builds connections from config plus the credentials file
pub struct MySqlConnector {
    config: SourceConfig,
}

impl MySqlConnector {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Port precedence: configuration, then the option file, then 3306
    pub fn port(&self, client: &ClientOptions) -> u16 {
        self.config.port.or(client.port).unwrap_or(DEFAULT_PORT)
    }

    /// Merge the credentials file with explicit settings
    ///
    /// Host and database come from config; user and password only from the
    /// credentials file.
    pub fn connect_options(&self, client: &ClientOptions) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.port(client))
            .database(&self.config.database)
            .charset("utf8mb4");

        if let Some(ref user) = client.user {
            options = options.username(user);
        }
        if let Some(ref password) = client.password {
            options = options.password(password);
        }
        options
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Source = MySqlSource;

    async fn connect(&self) -> Result<MySqlSource> {
        let client = ClientOptions::from_file(&self.config.defaults_file)?;
        let options = self.connect_options(&client);

        info!(
            "Connecting to {}:{}/{}",
            self.config.host,
            self.port(&client),
            self.config.database
        );
        let conn = options.connect().await?;
        Ok(MySqlSource { conn })
    }
}

/// The run's single MySQL connection
pub struct MySqlSource {
    conn: MySqlConnection,
}

#[async_trait]
impl DataSource for MySqlSource {
    async fn max_partition_key(&mut self) -> Result<Option<u64>> {
        let max: Option<u64> = sqlx::query_scalar(MAX_PAGE_ID_SQL)
            .fetch_one(&mut self.conn)
            .await?;
        debug!("MAX(page_id) = {:?}", max);
        Ok(max)
    }

    fn open_window<'a>(&'a mut self, window: Window) -> Box<dyn RowCursor + 'a> {
        let stream = sqlx::query_as::<_, (u64, u64, String)>(WINDOW_SQL)
            .bind(window.lo)
            .bind(window.hi)
            .fetch(&mut self.conn);

        Box::new(MySqlRowCursor {
            stream: Some(stream),
            window,
            total_fetched: 0,
        })
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        debug!("Closed data source connection");
        Ok(())
    }
}

/// Streaming result set of one window query
struct MySqlRowCursor<'a> {
    stream: Option<BoxStream<'a, std::result::Result<(u64, u64, String), sqlx::Error>>>,
    window: Window,
    total_fetched: u64,
}

#[async_trait]
impl RowCursor for MySqlRowCursor<'_> {
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<LinkRow>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Vec::new());
        };

        let mut chunk = Vec::with_capacity(max_rows);
        while chunk.len() < max_rows {
            match stream.try_next().await {
                Ok(Some((source_id, target_id, link_type))) => {
                    chunk.push(LinkRow {
                        source_id,
                        target_id,
                        link_type,
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    // Release the result set before reporting
                    self.stream = None;
                    return Err(e.into());
                }
            }
        }

        if chunk.is_empty() {
            debug!(
                "Window {} exhausted after {} rows",
                self.window, self.total_fetched
            );
            self.stream = None;
        } else {
            self.total_fetched += chunk.len() as u64;
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn connector() -> MySqlConnector {
        connector_on(Some(3307))
    }

    fn connector_on(port: Option<u16>) -> MySqlConnector {
        MySqlConnector::new(SourceConfig {
            host: "db.example".into(),
            port,
            database: "commonswiki_p".into(),
            defaults_file: PathBuf::from("/nonexistent/replica.my.cnf"),
        })
    }

    #[test]
    fn test_window_query_keeps_range_in_join() {
        let join = WINDOW_SQL.find("JOIN page ON").unwrap();
        let where_clause = WINDOW_SQL.find("WHERE").unwrap();
        let lower = WINDOW_SQL.find("page_id >= ?").unwrap();
        let upper = WINDOW_SQL.find("page_id < ?").unwrap();

        assert!(join < lower && lower < upper && upper < where_clause);
        assert!(WINDOW_SQL.contains("page_namespace = 14"));
        assert!(WINDOW_SQL.contains("cl_type != 'page'"));
        assert!(WINDOW_SQL.trim_end().ends_with("ORDER BY page_id"));
        assert_eq!(WINDOW_SQL.matches('?').count(), 2);
    }

    #[test]
    fn test_connect_options_use_config_endpoint() {
        let client = ClientOptions {
            user: Some("s51234".into()),
            password: Some("secret".into()),
            port: Some(1),
        };
        let options = connector().connect_options(&client);
        assert_eq!(options.get_host(), "db.example");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "s51234");
        assert_eq!(options.get_database(), Some("commonswiki_p"));
    }

    #[test]
    fn test_option_file_port_applies_when_config_leaves_it_unset() {
        let from_file = ClientOptions {
            port: Some(3307),
            ..ClientOptions::default()
        };
        let unset = connector_on(None);
        assert_eq!(unset.connect_options(&from_file).get_port(), 3307);
        assert_eq!(unset.port(&ClientOptions::default()), DEFAULT_PORT);

        let explicit = connector_on(Some(4000));
        assert_eq!(explicit.port(&from_file), 4000);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_connecting() {
        let err = match connector().connect().await {
            Ok(_) => panic!("connect should fail without a credentials file"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            crate::error::StreamError::Config(crate::error::ConfigError::FileNotFound(_))
        ));
    }
}
