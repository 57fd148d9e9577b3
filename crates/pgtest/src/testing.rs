//! In-memory doubles for the admin connection and migration runner.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::admin::AdminConnection;
use crate::config::ConnectionProfile;
use crate::migrate::{MigrationDriver, MigrationError, MigrationRunner, MigrationStep};

pub fn profile(database: &str) -> ConnectionProfile {
    ConnectionProfile {
        host: "localhost".to_string(),
        port: 5432,
        database: database.to_string(),
        user: "pgtest".to_string(),
        password: "secret".to_string(),
        ssl: false,
    }
}

fn unquote(ident: &str) -> String {
    ident
        .trim_end_matches(';')
        .trim_matches('"')
        .replace("\"\"", "\"")
}

#[derive(Default)]
struct ServerState {
    databases: BTreeSet<String>,
    statements: Vec<String>,
    fail_on: Vec<String>,
}

/// Tracks which databases exist and every statement it was sent.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement starting with `prefix`.
    pub fn fail_on(&self, prefix: &str) {
        self.state.lock().unwrap().fail_on.push(prefix.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn databases(&self) -> Vec<String> {
        self.state.lock().unwrap().databases.iter().cloned().collect()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state.lock().unwrap().databases.contains(name)
    }
}

#[async_trait]
impl AdminConnection for FakeServer {
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(statement.to_string());

        if state.fail_on.iter().any(|p| statement.starts_with(p.as_str())) {
            return Err(sqlx::Error::Protocol(format!("rejected: {statement}")));
        }

        let words: Vec<&str> = statement.split_whitespace().collect();
        match words.as_slice() {
            ["drop", "database", "if", "exists", name] => {
                state.databases.remove(&unquote(name));
            }
            ["drop", "database", name] => {
                let name = unquote(name);
                if !state.databases.remove(&name) {
                    return Err(sqlx::Error::Protocol(format!(
                        "database \"{name}\" does not exist"
                    )));
                }
            }
            ["create", "database", name, "template", template] => {
                let (name, template) = (unquote(name), unquote(template));
                if !state.databases.contains(&template) {
                    return Err(sqlx::Error::Protocol(format!(
                        "template database \"{template}\" does not exist"
                    )));
                }
                if !state.databases.insert(name.clone()) {
                    return Err(sqlx::Error::Protocol(format!(
                        "database \"{name}\" already exists"
                    )));
                }
            }
            ["create", "database", name] => {
                let name = unquote(name);
                if !state.databases.insert(name.clone()) {
                    return Err(sqlx::Error::Protocol(format!(
                        "database \"{name}\" already exists"
                    )));
                }
            }
            _ => {
                return Err(sqlx::Error::Protocol(format!(
                    "unsupported statement: {statement}"
                )))
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct DriverState {
    steps: usize,
    fail_at: Option<usize>,
    up_calls: usize,
    opened: Vec<String>,
    closed: bool,
}

/// Hands out runners that apply `steps` versions, optionally failing on one call.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<DriverState>>,
}

impl FakeDriver {
    pub fn with_steps(steps: usize) -> Self {
        let driver = Self::default();
        driver.state.lock().unwrap().steps = steps;
        driver
    }

    /// Runners fail with `MigrationError::Dirty(call)` on the `call`-th `up`.
    pub fn failing_at(call: usize) -> Self {
        let driver = Self::with_steps(call + 3);
        driver.state.lock().unwrap().fail_at = Some(call);
        driver
    }

    pub fn opened_against(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn up_calls(&self) -> usize {
        self.state.lock().unwrap().up_calls
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

pub struct FakeRunner {
    state: Arc<Mutex<DriverState>>,
    applied: usize,
}

#[async_trait]
impl MigrationDriver for FakeDriver {
    type Runner = FakeRunner;

    async fn open(
        &self,
        _location: &Path,
        profile: &ConnectionProfile,
    ) -> Result<FakeRunner, MigrationError> {
        let mut state = self.state.lock().unwrap();
        state.opened.push(profile.database.clone());
        state.closed = false;
        Ok(FakeRunner {
            state: Arc::clone(&self.state),
            applied: 0,
        })
    }
}

#[async_trait]
impl MigrationRunner for FakeRunner {
    async fn up(&mut self) -> Result<MigrationStep, MigrationError> {
        let mut state = self.state.lock().unwrap();
        state.up_calls += 1;
        if state.fail_at == Some(state.up_calls) {
            return Err(MigrationError::Dirty(state.up_calls as i64));
        }
        if self.applied < state.steps {
            self.applied += 1;
            return Ok(MigrationStep::Applied {
                version: self.applied as i64,
                description: format!("step {}", self.applied),
            });
        }
        Ok(MigrationStep::NoChange)
    }

    async fn close(self) -> Result<(), MigrationError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}
