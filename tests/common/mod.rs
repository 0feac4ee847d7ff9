//! Scripted in-process transport for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use igniteworks::config::{ConnectOptions, Endpoint};
use igniteworks::transport::{Connector, QueryResult, SqlExecutor};
use igniteworks::{IgniteError, IgniteResult, Value};

/// One recorded `execute_sql` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub parameters: Option<Vec<Value>>,
    pub bulk: Option<Vec<Vec<Value>>>,
}

#[derive(Default)]
pub struct Script {
    responses: HashMap<String, QueryResult>,
    failures: HashMap<String, String>,
    refuse: bool,
    pub executed: Vec<Executed>,
    pub opened: usize,
    pub closed: usize,
    pub endpoint: Option<Endpoint>,
}

/// Answers statements from a fixed script and records everything it sees.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Rc<RefCell<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `sql` with `result`.
    pub fn respond(self, sql: &str, result: QueryResult) -> Self {
        self.script
            .borrow_mut()
            .responses
            .insert(sql.to_string(), result);
        self
    }

    /// Reject `sql` with a remote execution error.
    pub fn fail(self, sql: &str, message: &str) -> Self {
        self.script
            .borrow_mut()
            .failures
            .insert(sql.to_string(), message.to_string());
        self
    }

    /// Fail every open attempt like an unreachable node.
    pub fn refusing() -> Self {
        let connector = Self::default();
        connector.script.borrow_mut().refuse = true;
        connector
    }

    pub fn opened(&self) -> usize {
        self.script.borrow().opened
    }

    pub fn closed(&self) -> usize {
        self.script.borrow().closed
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.script.borrow().executed.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.script.borrow().endpoint.clone()
    }
}

struct ScriptedSession {
    script: Rc<RefCell<Script>>,
}

impl Connector for ScriptedConnector {
    fn open(
        &self,
        endpoint: &Endpoint,
        _options: &ConnectOptions,
    ) -> IgniteResult<Box<dyn SqlExecutor>> {
        let mut script = self.script.borrow_mut();
        if script.refuse {
            return Err(IgniteError::Connection(format!(
                "Connection refused: {}",
                endpoint
            )));
        }
        script.opened += 1;
        script.endpoint = Some(endpoint.clone());
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
        }))
    }
}

impl SqlExecutor for ScriptedSession {
    fn execute_sql(
        &mut self,
        sql: &str,
        parameters: Option<&[Value]>,
        bulk_parameters: Option<&[Vec<Value>]>,
    ) -> IgniteResult<QueryResult> {
        let mut script = self.script.borrow_mut();
        script.executed.push(Executed {
            sql: sql.to_string(),
            parameters: parameters.map(<[Value]>::to_vec),
            bulk: bulk_parameters.map(<[Vec<Value>]>::to_vec),
        });

        if let Some(message) = script.failures.get(sql) {
            return Err(IgniteError::execution(message.clone()));
        }
        Ok(script.responses.get(sql).cloned().unwrap_or_default())
    }

    fn close(&mut self) {
        self.script.borrow_mut().closed += 1;
    }
}

/// Rows of string/int pairs.
pub fn rows(values: &[(&str, i64)]) -> Vec<Vec<Value>> {
    values
        .iter()
        .map(|(s, i)| vec![Value::from(*s), Value::Int(*i)])
        .collect()
}

pub fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
