//! Common test utilities for rust-jetport tests

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use rust_jetport::repair::CompletionClient;
use rust_jetport::{
    ControlMapping, ConversionResult, ConvertOptions, LegacyType, QueryDescriptor, QueryType,
    RepairError, StateMode,
};

/// Options targeting the `app` schema.
pub fn app_options() -> ConvertOptions {
    ConvertOptions::default().with_schema("app")
}

pub fn cross_join_options() -> ConvertOptions {
    app_options().with_state_mode(StateMode::CrossJoin)
}

/// The mapping used throughout: `Main.Filter` is stored in `orders.status`.
pub fn orders_mapping() -> ControlMapping {
    ControlMapping::new()
        .with("main.filter", "orders", "status")
        .with("main.region", "prefs", "region")
}

/// A descriptor with a legacy type code.
pub fn query(name: &str, code: i64, sql: &str) -> QueryDescriptor {
    QueryDescriptor::new(name, QueryType::from_code(code), sql)
}

pub fn query_with_param(name: &str, code: i64, sql: &str, param: &str, ty: LegacyType) -> QueryDescriptor {
    query(name, code, sql).with_parameter(param, ty)
}

/// The main object's statement (always last).
pub fn main_statement(result: &ConversionResult) -> &str {
    result.statements.last().map(String::as_str).unwrap_or("")
}

/// Whether any warning contains `needle`.
pub fn has_warning(result: &ConversionResult, needle: &str) -> bool {
    result.warnings.iter().any(|w| w.contains(needle))
}

/// Completion client returning a canned reply and recording prompts.
pub struct FakeCompletionClient {
    reply: Result<String, u16>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeCompletionClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client whose service answers with an HTTP error status.
    pub fn failing(status: u16) -> Self {
        Self {
            reply: Err(status),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, RepairError> {
        self.prompts.lock().unwrap().push(user.to_string());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(status) => Err(RepairError::ServiceStatus {
                status: *status,
                body: "service unavailable".to_string(),
            }),
        }
    }
}
