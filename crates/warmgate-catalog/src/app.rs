// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The catalog [`Application`] and its per-executor container.

use tracing::{debug, info};
use warmgate_core::{
    Application, BootContext, BootError, Container, NormalizedRequest, Response,
};
use warmgate_state::{Inspectable, SharedRegistry};

use crate::graphql::{self, GraphQlRequest};
use crate::resolver::Resolver;
use crate::services::{
    CategoryRepository, ProductRepository, QueryLog, RequestContext, SchemaRegistry, UrlResolver,
};

/// The only area the catalog can boot.
pub const GRAPHQL_AREA: &str = "graphql";

/// Header selecting the store view.
pub const STORE_HEADER: &str = "store";

/// Boots [`CatalogContainer`]s.
#[derive(Debug, Clone)]
pub struct CatalogApp {
    reset_request_context: bool,
}

impl CatalogApp {
    /// Application that clears per-request data after every request.
    pub fn new() -> Self {
        Self {
            reset_request_context: true,
        }
    }

    /// Application whose containers keep the request context around.
    ///
    /// Leaks on purpose. Used to check that the state comparator notices.
    pub fn leaking_request_context() -> Self {
        Self {
            reset_request_context: false,
        }
    }
}

impl Default for CatalogApp {
    fn default() -> Self {
        Self::new()
    }
}

impl Application for CatalogApp {
    type Container = CatalogContainer;

    fn boot(&self, ctx: &BootContext<'_>) -> Result<CatalogContainer, BootError> {
        if ctx.area != GRAPHQL_AREA {
            return Err(BootError::new(format!(
                "unknown application area '{}'",
                ctx.area
            )));
        }

        let schema = SchemaRegistry::generate(ctx.area, ctx.generation.value());
        info!(
            worker_id = ctx.worker_id,
            area = ctx.area,
            generation = schema.generation(),
            "Catalog schema generated"
        );

        Ok(CatalogContainer {
            schema,
            categories: CategoryRepository::categories(),
            products: ProductRepository::products(),
            url_resolver: None,
            context: RequestContext::default(),
            query_log: QueryLog::default(),
            reset_request_context: self.reset_request_context,
        })
    }
}

/// Object graph of one executor.
#[derive(Debug)]
pub struct CatalogContainer {
    schema: SchemaRegistry,
    categories: CategoryRepository,
    products: ProductRepository,
    url_resolver: Option<UrlResolver>,
    context: RequestContext,
    query_log: QueryLog,
    reset_request_context: bool,
}

impl CatalogContainer {
    /// Generated schema.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Category identity map.
    pub fn categories(&self) -> &CategoryRepository {
        &self.categories
    }

    /// Request counter.
    pub fn query_log(&self) -> &QueryLog {
        &self.query_log
    }

    /// Context of the request being served, empty between requests.
    pub fn request_context(&self) -> &RequestContext {
        &self.context
    }

    fn execute(&mut self, body: GraphQlRequest) -> serde_json::Value {
        let variables = body.variables.unwrap_or_default();
        match graphql::parse(&body.query) {
            Ok(operation) => Resolver {
                schema: &self.schema,
                categories: &mut self.categories,
                products: &mut self.products,
                url_resolver: &mut self.url_resolver,
                variables: &variables,
            }
            .execute(&operation),
            Err(err) => serde_json::json!({
                "errors": [{
                    "message": err.to_string(),
                    "extensions": { "category": "graphql" },
                }],
            }),
        }
    }
}

impl Container for CatalogContainer {
    fn dispatch(&mut self, request: NormalizedRequest) -> Response {
        if !is_graphql_path(request.path_info()) {
            return Response::error(
                404,
                "NOT_FOUND",
                format!("No route for '{}'", request.path_info()),
            );
        }
        if request.method() != "POST" {
            return Response::error(
                405,
                "METHOD_NOT_ALLOWED",
                format!("Method {} is not allowed", request.method()),
            )
            .with_header("allow", "POST");
        }
        let body: GraphQlRequest = match serde_json::from_slice(request.content()) {
            Ok(body) => body,
            Err(err) => {
                return Response::error(
                    400,
                    "BAD_REQUEST",
                    format!("Unable to parse the request body: {}", err),
                );
            }
        };

        let operation = body.operation_name.clone();
        self.context
            .begin(request.header(STORE_HEADER), operation.as_deref());

        let result = self.execute(body);

        self.query_log.record(operation.as_deref());
        if self.reset_request_context {
            self.context.reset();
        }
        debug!(
            operation = operation.as_deref().unwrap_or_default(),
            served = self.query_log.served(),
            "GraphQL request executed"
        );

        Response::json(200, &result)
    }
}

impl SharedRegistry for CatalogContainer {
    fn visit_shared(&self, visit: &mut dyn FnMut(&dyn Inspectable)) {
        visit(&self.schema);
        visit(&self.categories);
        visit(&self.products);
        if let Some(url_resolver) = &self.url_resolver {
            visit(url_resolver);
        }
        visit(&self.context);
        visit(&self.query_log);
    }
}

/// Whether `path_info` addresses the GraphQL endpoint.
pub fn is_graphql_path(path_info: &str) -> bool {
    path_info
        .trim_end_matches('/')
        .to_ascii_lowercase()
        .ends_with("/graphql")
}
