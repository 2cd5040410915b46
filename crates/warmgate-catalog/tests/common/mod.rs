// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for warmgate-catalog integration tests.
//!
//! Storefront queries as a PWA client sends them, plus helpers for driving
//! a catalog worker with a state comparator around every request.

#![allow(dead_code)]

use std::sync::Arc;

use warmgate_catalog::CatalogApp;
use warmgate_core::{
    InMemoryVersionOracle, Outcome, RequestEnvelope, ResetStrategy, Response, VersionGate,
    Worker, WorkerSettings,
};
use warmgate_state::{Comparator, DiffReport};

/// A storefront query and a fragment its response must contain.
pub struct StorefrontQuery {
    pub operation: &'static str,
    pub body: &'static str,
    pub expected: &'static str,
}

pub const NAVIGATION_MENU: StorefrontQuery = StorefrontQuery {
    operation: "navigationMenu",
    body: r#"{"query":"query navigationMenu($id: Int!) {\n  category(id: $id) {\n    id\n    name\n    product_count\n    path\n    children {\n      id\n      name\n      position\n      level\n      url_key\n      url_path\n      product_count\n      children_count\n      path\n      productImagePreview: products(pageSize: 1) {\n        items {\n          small_image {\n  label\n url\n          }\n        }\n      }\n    }\n  }\n}","variables":{"id":4},"operationName":"navigationMenu"}"#,
    expected: r#""id":4,"name":"Category 1.1","product_count":2,"#,
};

pub const PRODUCT_BY_NAME: StorefrontQuery = StorefrontQuery {
    operation: "productDetailByName",
    body: r#"{"query":"query productDetailByName($name: String, $onServer: Boolean!) {\n    products(filter: { name: { eq: $name } }) {\n        items {\n  id\n  sku\n  name\n  ... on ConfigurableProduct {\n    configurable_options {\n        attribute_code\n        attribute_id\n        id\n        label\n        values {\n  default_label\n  label\n  store_label\n  use_default_value\n  value_index\n        }\n    }\n    variants {\n        product {\n  #fashion_color\n  #fashion_size\n  id\n  media_gallery_entries {\n    disabled\n    file\n    label\n    position\n  }\n  sku\n  stock_status\n        }\n    }\n  }\n  meta_title @include(if: $onServer)\n  meta_keyword @include(if: $onServer)\n  meta_description @include(if: $onServer)\n        }\n    }\n}","variables":{"name":"Configurable Product","onServer":false},"operationName":"productDetailByName"}"#,
    expected: r#""sku":"configurable","name":"Configurable Product""#,
};

pub const CATEGORY_PRODUCTS: StorefrontQuery = StorefrontQuery {
    operation: "category",
    body: r#"{"query":"query category($id: Int!, $currentPage: Int, $pageSize: Int) {\n  category(id: $id) {\n    product_count\n    description\n    url_key\n    name\n    id\n    breadcrumbs {\n      category_name\n      category_url_key\n      __typename\n    }\n    products(pageSize: $pageSize, currentPage: $currentPage) {\n      total_count\n      items {\n        id\n        name\n        # small_image\n        # short_description\n        url_key\n        special_price\n        special_from_date\n        special_to_date\n        price {\n          regularPrice {\n            amount {\n              value\n              currency\n              __typename\n            }\n            __typename\n          }\n          __typename\n        }\n        __typename\n      }\n      __typename\n    }\n    __typename\n  }\n}\n","variables":{"id":4,"currentPage":1,"pageSize":12},"operationName":"category"}"#,
    expected: r#""url_key":"category-1-1","name":"Category 1.1""#,
};

pub const PRODUCT_DETAIL: StorefrontQuery = StorefrontQuery {
    operation: "productDetail",
    body: r#"{"query":"query productDetail($name: String, $onServer: Boolean!) {\n    productDetail: products(filter: { name: { eq: $name } }) {\n        items {\n            sku\n            name\n            price {\n                regularPrice {\n                    amount {\n                        currency\n                        value\n                    }\n                }\n            }\n            description {html}\n            media_gallery_entries {\n                label\n                position\n                disabled\n                file\n            }\n            ... on ConfigurableProduct {\n                configurable_options {\n                    attribute_code\n                    attribute_id\n                    id\n                    label\n                    values {\n                        default_label\n                        label\n                        store_label\n                        use_default_value\n                        value_index\n                    }\n                }\n                variants {\n                    product {\n                        id\n                        media_gallery_entries {\n                            disabled\n                            file\n                            label\n                            position\n                        }\n                        sku\n                        stock_status\n                    }\n                }\n            }\n            meta_title @include(if: $onServer)\n            meta_keyword @include(if: $onServer)\n            meta_description @include(if: $onServer)\n        }\n    }\n}","variables":{"name":"Simple Product1","onServer":false},"operationName":"productDetail"}"#,
    expected: r#""sku":"simple1","name":"Simple Product1""#,
};

pub const RESOLVE_URL: StorefrontQuery = StorefrontQuery {
    operation: "resolveUrl",
    body: r#"{"query":"query resolveUrl($urlKey: String!) {\n    urlResolver(url: $urlKey) {\n        type\n        id\n    }\n}","variables":{"urlKey":"no-route"},"operationName":"resolveUrl"}"#,
    expected: r#""type":"CMS_PAGE","id":1"#,
};

pub const ALL_QUERIES: [&StorefrontQuery; 5] = [
    &NAVIGATION_MENU,
    &PRODUCT_BY_NAME,
    &CATEGORY_PRODUCTS,
    &PRODUCT_DETAIL,
    &RESOLVE_URL,
];

/// GraphQL POST envelope the way the front controller hands it over.
pub fn envelope(body: &str) -> RequestEnvelope {
    RequestEnvelope::new(body.to_string())
        .with_header("content_type", "application/json")
        .with_path_info("/index.php/graphql")
        .with_server("request_method", "POST")
}

/// Boot a catalog worker against `oracle`.
pub fn catalog_worker(
    app: CatalogApp,
    oracle: &Arc<InMemoryVersionOracle>,
    strategy: ResetStrategy,
) -> Worker<CatalogApp> {
    let settings = WorkerSettings {
        reset_strategy: strategy,
        max_requests: 0,
        ..WorkerSettings::default()
    };
    Worker::boot(
        0,
        Arc::new(app),
        VersionGate::new(oracle.clone()),
        Arc::new(settings),
    )
    .expect("catalog worker should boot")
}

/// Comparator loaded with the bundled catalog rules.
pub fn comparator() -> Comparator {
    Comparator::new(warmgate_catalog::state_rules().expect("bundled rules parse"))
}

/// Unwrap a response outcome.
pub fn respond(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Respond(response) => response,
        Outcome::Handoff(envelope) => panic!("expected a response, got handoff of {:?}", envelope),
    }
}

/// Serve `query` with state captured around it.
///
/// Returns the response body and what changed in shared state.
pub fn observed_request(
    worker: &mut Worker<CatalogApp>,
    comparator: &mut Comparator,
    query: &StorefrontQuery,
    first_request: bool,
) -> (String, DiffReport) {
    let container = worker.container().expect("worker has a container");
    comparator.capture_before(container, first_request);

    let response = respond(worker.handle(envelope(query.body)));
    assert_eq!(response.status, 200, "{}: {:?}", query.operation, response.content_str());

    let container = worker.container().expect("worker has a container");
    comparator.capture_after(container, first_request);

    let output = response
        .content_str()
        .expect("response is UTF-8")
        .to_string();
    (output, comparator.compare(query.operation))
}
