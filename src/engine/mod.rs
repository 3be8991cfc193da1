// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    function::{Function, FunctionHandler, FunctionResult, FunctionsRegistry},
    protocol::ErrorBody,
    trigger::{Trigger, TriggerRegistry},
};

pub struct RegisterFunctionRequest {
    pub function_id: String,
    pub description: Option<String>,
    pub request_format: Option<Value>,
    pub response_format: Option<Value>,
}

pub struct Handler<H> {
    f: H,
}

impl<H, F> Handler<H>
where
    H: Fn(Value) -> F + Send + Sync + 'static,
    F: Future<Output = FunctionResult<Option<Value>, ErrorBody>> + Send + 'static,
{
    pub fn new(f: H) -> Self {
        Self { f }
    }

    pub fn call(&self, input: Value) -> F {
        (self.f)(input)
    }
}

#[allow(async_fn_in_trait)]
pub trait EngineTrait: Send + Sync {
    /// Request/response: runs the function and waits for its single reply.
    async fn call(
        &self,
        function_id: &str,
        input: impl Serialize + Send,
    ) -> Result<Option<Value>, ErrorBody>;

    /// One-way: delivers `input` to the function named `name` (if any) and to
    /// every trigger bound to `name`. Returns immediately; results are dropped.
    fn notify(&self, name: &str, input: impl Serialize + Send);

    fn register_function(
        &self,
        request: RegisterFunctionRequest,
        handler: Box<dyn FunctionHandler + Send + Sync>,
    );

    fn register_function_handler<H, F>(
        &self,
        request: RegisterFunctionRequest,
        handler: Handler<H>,
    ) where
        H: Fn(Value) -> F + Send + Sync + 'static,
        F: Future<Output = FunctionResult<Option<Value>, ErrorBody>> + Send + 'static;
}

#[derive(Default, Clone)]
pub struct Engine {
    pub functions: Arc<FunctionsRegistry>,
    pub trigger_registry: Arc<TriggerRegistry>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            functions: Arc::new(FunctionsRegistry::new()),
            trigger_registry: Arc::new(TriggerRegistry::new()),
        }
    }

    pub fn register_trigger(&self, trigger: Trigger) {
        self.trigger_registry.register_trigger(trigger);
    }

    pub fn unregister_trigger(&self, id: &str) -> Option<Trigger> {
        self.trigger_registry.unregister_trigger(id)
    }

    async fn invoke(
        &self,
        invocation_id: Option<Uuid>,
        function_id: &str,
        input: Value,
    ) -> Result<Option<Value>, ErrorBody> {
        let Some(function) = self.functions.get(function_id) else {
            return Err(ErrorBody {
                code: "function_not_found".into(),
                message: format!("Function {} not found", function_id),
            });
        };

        match function.call_handler(invocation_id, input).await {
            FunctionResult::Success(result) => Ok(result),
            FunctionResult::Failure(error) => Err(error),
            FunctionResult::NoResult => Ok(None),
        }
    }

    /// Spawns every listener bound to `event`; results are only logged.
    pub fn fire_triggers(&self, event: &str, data: Value) {
        let current_span = tracing::Span::current();

        for trigger in self.trigger_registry.triggers_for(event) {
            let engine = self.clone();
            let data = data.clone();
            let span_function_id = trigger.function_id.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = engine.invoke(None, &trigger.function_id, data).await {
                        tracing::warn!(
                            trigger_id = %trigger.id,
                            function_id = %trigger.function_id,
                            error = %err,
                            "Trigger handler failed"
                        );
                    }
                }
                .instrument(tracing::info_span!(parent: current_span.clone(), "fire_trigger", function_id = %span_function_id)),
            );
        }
    }
}

impl EngineTrait for Engine {
    async fn call(
        &self,
        function_id: &str,
        input: impl Serialize + Send,
    ) -> Result<Option<Value>, ErrorBody> {
        let input = serde_json::to_value(input).map_err(|e| ErrorBody {
            code: "serialization_error".into(),
            message: e.to_string(),
        })?;

        let invocation_id = Uuid::new_v4();
        self.invoke(Some(invocation_id), function_id, input)
            .instrument(tracing::debug_span!("call", function_id = %function_id, %invocation_id))
            .await
    }

    fn notify(&self, name: &str, input: impl Serialize + Send) {
        let input = match serde_json::to_value(input) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(name = %name, error = %err, "Dropping notification with unserializable payload");
                return;
            }
        };

        if self.functions.contains(name) {
            let engine = self.clone();
            let function_id = name.to_string();
            let data = input.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.invoke(None, &function_id, data).await {
                    tracing::warn!(function_id = %function_id, error = %err, "One-way invocation failed");
                }
            });
        }

        self.fire_triggers(name, input);
    }

    fn register_function(
        &self,
        request: RegisterFunctionRequest,
        handler: Box<dyn FunctionHandler + Send + Sync>,
    ) {
        let RegisterFunctionRequest {
            function_id,
            description,
            request_format,
            response_format,
        } = request;

        let handler_arc: Arc<dyn FunctionHandler + Send + Sync> = handler.into();
        let handler_function_id = function_id.clone();

        let function = Function {
            handler: Arc::new(move |invocation_id, input| {
                let handler = handler_arc.clone();
                let id = handler_function_id.clone();
                Box::pin(async move { handler.handle_function(invocation_id, id, input).await })
            }),
            function_id: function_id.clone(),
            description,
            request_format,
            response_format,
            registered_at: Utc::now(),
        };

        self.functions.register_function(function_id, function);
    }

    fn register_function_handler<H, F>(&self, request: RegisterFunctionRequest, handler: Handler<H>)
    where
        H: Fn(Value) -> F + Send + Sync + 'static,
        F: Future<Output = FunctionResult<Option<Value>, ErrorBody>> + Send + 'static,
    {
        let handler_arc: Arc<H> = Arc::new(handler.f);

        let function = Function {
            handler: Arc::new(move |_id, input| {
                let handler = handler_arc.clone();
                Box::pin(async move { handler(input).await })
            }),
            function_id: request.function_id.clone(),
            description: request.description,
            request_format: request.request_format,
            response_format: request.response_format,
            registered_at: Utc::now(),
        };

        self.functions
            .register_function(request.function_id, function);
    }
}
