// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Query execution against the container's shared services.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::fixtures::{self, Category, Product};
use crate::graphql::{self, Field, Operation};
use crate::services::{CategoryRepository, ProductRepository, SchemaRegistry, UrlResolver};

/// Category served when `category` is queried without an id.
pub const DEFAULT_CATEGORY_ID: i64 = 2;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Field-level resolution failure, reported under `errors`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The type has no such field.
    #[error("Cannot query field \"{field}\" on type \"{type_name}\".")]
    UnknownField {
        /// Requested field.
        field: String,
        /// Type it was requested on.
        type_name: String,
    },

    /// A composite field was selected without sub-fields.
    #[error("Field \"{field}\" of type \"{type_name}\" must have a selection of subfields.")]
    MissingSelection {
        /// Composite field.
        field: String,
        /// Its type.
        type_name: String,
    },

    /// An argument is missing or out of range.
    #[error("{0}")]
    InvalidArgument(String),

    /// The requested category does not exist.
    #[error("Category doesn't exist")]
    NoSuchCategory,
}

type Resolved = Result<Value, ResolveError>;

/// Executes one operation. Borrows the services for the duration.
pub(crate) struct Resolver<'a> {
    pub schema: &'a SchemaRegistry,
    pub categories: &'a mut CategoryRepository,
    pub products: &'a mut ProductRepository,
    pub url_resolver: &'a mut Option<UrlResolver>,
    pub variables: &'a Map<String, Value>,
}

impl Resolver<'_> {
    /// Resolve every root field. Failing fields are `null` with an error.
    pub fn execute(&mut self, operation: &Operation) -> Value {
        let mut data = Map::new();
        let mut errors = Vec::new();
        for field in &operation.selection {
            if !field.is_included(self.variables) {
                continue;
            }
            let value = self.root_field(field).unwrap_or_else(|err| {
                errors.push(json!({
                    "message": err.to_string(),
                    "extensions": { "category": "graphql" },
                    "path": [field.response_key()],
                }));
                Value::Null
            });
            data.insert(field.response_key().to_string(), value);
        }

        let mut body = Map::new();
        if !errors.is_empty() {
            body.insert("errors".to_string(), Value::Array(errors));
        }
        body.insert("data".to_string(), Value::Object(data));
        Value::Object(body)
    }

    fn root_field(&mut self, field: &Field) -> Resolved {
        if field.name == "__typename" {
            return Ok(json!("Query"));
        }
        if !self.schema.has_query_field(&field.name) {
            return Err(unknown(field, "Query"));
        }
        match field.name.as_str() {
            "category" => {
                let id = match graphql::argument(&field.arguments, "id", self.variables) {
                    Some(id) => id.as_i64().ok_or_else(|| {
                        ResolveError::InvalidArgument("Category id must be an integer.".into())
                    })?,
                    None => DEFAULT_CATEGORY_ID,
                };
                let category = self
                    .categories
                    .get(id)
                    .ok_or(ResolveError::NoSuchCategory)?;
                self.category(category, field)
            }
            "products" => {
                let ids: Vec<i64> = fixtures::PRODUCTS
                    .iter()
                    .filter(|product| self.matches_filter(product, &field.arguments))
                    .map(|product| product.id)
                    .collect();
                self.product_page(&ids, field, "Products")
            }
            "urlResolver" => self.url(field),
            _ => Err(unknown(field, "Query")),
        }
    }

    /// Build an object of `type_name` from the sub-selection of `field`.
    ///
    /// `resolve` returns `None` for fields the type does not have.
    fn object<F>(&mut self, type_name: &str, field: &Field, mut resolve: F) -> Resolved
    where
        F: FnMut(&mut Self, &Field) -> Result<Option<Value>, ResolveError>,
    {
        if field.selection.is_empty() {
            return Err(ResolveError::MissingSelection {
                field: field.name.clone(),
                type_name: type_name.to_string(),
            });
        }
        let mut object = Map::new();
        for sub in &field.selection {
            if !sub.is_included(self.variables) || !sub.applies_to(type_name) {
                continue;
            }
            let value = if sub.name == "__typename" {
                json!(type_name)
            } else {
                resolve(self, sub)?.ok_or_else(|| unknown(sub, type_name))?
            };
            object.insert(sub.response_key().to_string(), value);
        }
        Ok(Value::Object(object))
    }

    fn category(&mut self, category: &'static Category, field: &Field) -> Resolved {
        self.object("CategoryTree", field, |this, sub| {
            Ok(Some(match sub.name.as_str() {
                "id" => json!(category.id),
                "name" => json!(category.name),
                "url_key" => json!(category.url_key),
                "url_path" => json!(category.url_path),
                "url_suffix" => json!(".html"),
                "path" => json!(category.path),
                "level" => json!(category.level),
                "position" => json!(category.position),
                "description" => Value::Null,
                "include_in_menu" => json!(1),
                "product_count" => json!(category.product_ids.len()),
                "children_count" => json!(fixtures::children(category.id).len().to_string()),
                "children" => {
                    let mut children = Vec::new();
                    for child in fixtures::children(category.id) {
                        if let Some(child) = this.categories.get(child.id) {
                            children.push(this.category(child, sub)?);
                        }
                    }
                    Value::Array(children)
                }
                "products" => this.product_page(category.product_ids, sub, "CategoryProducts")?,
                "breadcrumbs" => this.breadcrumbs(category, sub)?,
                _ => return Ok(None),
            }))
        })
    }

    fn breadcrumbs(&mut self, category: &'static Category, field: &Field) -> Resolved {
        let mut crumbs = Vec::new();
        for id in category.path.split('/').filter_map(|id| id.parse::<i64>().ok()) {
            if id == category.id {
                continue;
            }
            let Some(ancestor) = self.categories.get(id) else {
                continue;
            };
            if ancestor.level < 2 {
                continue;
            }
            crumbs.push(json!({
                "__typename": "Breadcrumb",
                "category_id": ancestor.id,
                "category_name": ancestor.name,
                "category_level": ancestor.level,
                "category_url_key": ancestor.url_key,
                "category_url_path": ancestor.url_path,
            }));
        }
        if crumbs.is_empty() {
            return Ok(Value::Null);
        }
        project(&Value::Array(crumbs), field, self.variables)
    }

    fn product_page(&mut self, ids: &[i64], field: &Field, type_name: &str) -> Resolved {
        let page_size = self.positive_argument(field, "pageSize", DEFAULT_PAGE_SIZE)?;
        let current_page = self.positive_argument(field, "currentPage", 1)?;
        let total_count = i64::try_from(ids.len()).unwrap_or(i64::MAX);
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count - 1) / page_size + 1
        };
        if total_count > 0 && current_page > total_pages {
            return Err(ResolveError::InvalidArgument(format!(
                "currentPage value {} specified is greater than the {} page(s) available.",
                current_page, total_pages
            )));
        }
        let skip = usize::try_from((current_page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);

        self.object(type_name, field, |this, sub| {
            Ok(Some(match sub.name.as_str() {
                "total_count" => json!(total_count),
                "items" => {
                    let mut items = Vec::new();
                    for id in ids.iter().skip(skip).take(take) {
                        if let Some(product) = this.products.get(*id) {
                            items.push(this.product(product, sub)?);
                        }
                    }
                    Value::Array(items)
                }
                "page_info" => project(
                    &json!({
                        "__typename": "SearchResultPageInfo",
                        "page_size": page_size,
                        "current_page": current_page,
                        "total_pages": total_pages,
                    }),
                    sub,
                    this.variables,
                )?,
                _ => return Ok(None),
            }))
        })
    }

    fn product(&mut self, product: &'static Product, field: &Field) -> Resolved {
        let type_name = match product.type_id {
            "configurable" => "ConfigurableProduct",
            _ => "SimpleProduct",
        };
        self.object(type_name, field, |this, sub| {
            let variables = this.variables;
            Ok(Some(match sub.name.as_str() {
                "id" => json!(product.id),
                "sku" => json!(product.sku),
                "name" => json!(product.name),
                "type_id" => json!(product.type_id),
                "url_key" => json!(product.url_key),
                "url_suffix" => json!(".html"),
                "stock_status" => json!("IN_STOCK"),
                "meta_title" => json!(product.name),
                "meta_keyword" => json!(product.sku),
                "meta_description" => Value::Null,
                "special_price" | "special_from_date" | "special_to_date" => Value::Null,
                "price" => project(&price(product), sub, variables)?,
                "description" => project(
                    &json!({
                        "__typename": "ComplexTextValue",
                        "html": format!("<p>{}</p>", product.name),
                    }),
                    sub,
                    variables,
                )?,
                "small_image" => project(&image(product), sub, variables)?,
                "media_gallery_entries" => project(&gallery(product), sub, variables)?,
                "configurable_options" if !product.variant_ids.is_empty() => {
                    project(&configurable_options(product), sub, variables)?
                }
                "variants" if !product.variant_ids.is_empty() => {
                    let mut variants = Vec::new();
                    for id in product.variant_ids {
                        let Some(variant) = this.products.get(*id) else {
                            continue;
                        };
                        variants.push(this.object("ConfigurableVariant", sub, |this, vf| {
                            Ok(match vf.name.as_str() {
                                "product" => Some(this.product(variant, vf)?),
                                _ => None,
                            })
                        })?);
                    }
                    Value::Array(variants)
                }
                _ => return Ok(None),
            }))
        })
    }

    fn url(&mut self, field: &Field) -> Resolved {
        let url = graphql::argument(&field.arguments, "url", self.variables)
            .and_then(|url| url.as_str().map(str::to_string))
            .ok_or_else(|| {
                ResolveError::InvalidArgument(
                    "Field \"urlResolver\" argument \"url\" of type \"String!\" is required.".into(),
                )
            })?;
        let resolver = self.url_resolver.get_or_insert_with(UrlResolver::default);
        match resolver.resolve(&url) {
            Some(rewrite) => project(
                &json!({
                    "__typename": "EntityUrl",
                    "id": rewrite.entity_id,
                    "type": rewrite.entity_type,
                    "relative_url": rewrite.request_path,
                    "canonical_url": rewrite.request_path,
                    "redirectCode": 0,
                }),
                field,
                self.variables,
            ),
            None => Ok(Value::Null),
        }
    }

    fn matches_filter(&self, product: &Product, arguments: &str) -> bool {
        let attributes = [
            ("name", product.name),
            ("sku", product.sku),
            ("url_key", product.url_key),
        ];
        attributes.iter().all(|(attribute, actual)| {
            match graphql::filter_eq(arguments, attribute, self.variables) {
                Some(expected) => expected.as_str() == Some(*actual),
                None => true,
            }
        })
    }

    fn positive_argument(&self, field: &Field, name: &str, default: i64) -> Result<i64, ResolveError> {
        match graphql::argument(&field.arguments, name, self.variables) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => match value.as_i64() {
                Some(value) if value > 0 => Ok(value),
                _ => Err(ResolveError::InvalidArgument(format!(
                    "{} value must be greater than 0.",
                    name
                ))),
            },
        }
    }
}

/// Select the sub-fields of `field` out of a fixed value.
fn project(value: &Value, field: &Field, variables: &Map<String, Value>) -> Resolved {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| project(item, field, variables))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(object) => {
            let type_name = object
                .get("__typename")
                .and_then(Value::as_str)
                .unwrap_or("Object");
            if field.selection.is_empty() {
                return Err(ResolveError::MissingSelection {
                    field: field.name.clone(),
                    type_name: type_name.to_string(),
                });
            }
            let mut projected = Map::new();
            for sub in &field.selection {
                if !sub.is_included(variables) || !sub.applies_to(type_name) {
                    continue;
                }
                let value = object.get(&sub.name).ok_or_else(|| unknown(sub, type_name))?;
                projected.insert(sub.response_key().to_string(), project(value, sub, variables)?);
            }
            Ok(Value::Object(projected))
        }
        scalar => Ok(scalar.clone()),
    }
}

fn unknown(field: &Field, type_name: &str) -> ResolveError {
    ResolveError::UnknownField {
        field: field.name.clone(),
        type_name: type_name.to_string(),
    }
}

fn money(value: f64) -> Value {
    json!({ "__typename": "Money", "value": value, "currency": "USD" })
}

fn price(product: &Product) -> Value {
    let price = json!({
        "__typename": "Price",
        "amount": money(product.price),
        "adjustments": [],
    });
    json!({
        "__typename": "ProductPrices",
        "regularPrice": price,
    })
}

fn image(product: &Product) -> Value {
    json!({
        "__typename": "ProductImage",
        "label": product.name,
        "url": format!("/media/catalog/product/{}.jpg", product.url_key),
    })
}

fn gallery(product: &Product) -> Value {
    json!([{
        "__typename": "MediaGalleryEntry",
        "id": product.id,
        "media_type": "image",
        "label": product.name,
        "position": 1,
        "disabled": false,
        "file": format!("/{}.jpg", product.url_key),
    }])
}

fn color(index: usize) -> &'static str {
    ["Red", "Blue", "Green"].get(index).copied().unwrap_or("Other")
}

fn option_index(index: usize) -> i64 {
    10 + index as i64
}

fn configurable_options(product: &Product) -> Value {
    let values: Vec<Value> = (0..product.variant_ids.len())
        .map(|index| {
            json!({
                "__typename": "ConfigurableProductOptionsValues",
                "default_label": color(index),
                "label": color(index),
                "store_label": color(index),
                "use_default_value": true,
                "value_index": option_index(index),
            })
        })
        .collect();
    json!([{
        "__typename": "ConfigurableProductOptions",
        "id": 1,
        "attribute_id": "93",
        "attribute_code": "color",
        "label": "Color",
        "position": 0,
        "product_id": product.id,
        "values": values,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        schema: SchemaRegistry,
        categories: CategoryRepository,
        products: ProductRepository,
        url_resolver: Option<UrlResolver>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                schema: SchemaRegistry::generate("graphql", 0),
                categories: CategoryRepository::categories(),
                products: ProductRepository::products(),
                url_resolver: None,
            }
        }

        fn run(&mut self, query: &str, variables: Value) -> Value {
            let variables = variables.as_object().cloned().unwrap_or_default();
            let operation = graphql::parse(query).unwrap();
            Resolver {
                schema: &self.schema,
                categories: &mut self.categories,
                products: &mut self.products,
                url_resolver: &mut self.url_resolver,
                variables: &variables,
            }
            .execute(&operation)
        }
    }

    #[test]
    fn test_category_with_children_and_breadcrumbs() {
        let mut fixture = Fixture::new();
        let result = fixture.run(
            "query c($id: Int!) { category(id: $id) { id name product_count breadcrumbs { category_name } children { id products(pageSize: 1) { total_count items { sku } } } } }",
            json!({ "id": 4 }),
        );

        assert_eq!(
            result,
            json!({ "data": { "category": {
                "id": 4,
                "name": "Category 1.1",
                "product_count": 2,
                "breadcrumbs": [{ "category_name": "Category 1" }],
                "children": [{
                    "id": 5,
                    "products": { "total_count": 1, "items": [{ "sku": "simple2" }] }
                }]
            } } })
        );
        assert_eq!(fixture.categories.loaded().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_field_order_follows_selection() {
        let mut fixture = Fixture::new();
        let result = fixture.run("{ category(id: 4) { url_key name id } }", json!({}));
        assert_eq!(
            result.to_string(),
            r#"{"data":{"category":{"url_key":"category-1-1","name":"Category 1.1","id":4}}}"#
        );
    }

    #[test]
    fn test_products_filter_and_fragments() {
        let mut fixture = Fixture::new();
        let query = r#"query p($name: String) {
            products(filter: { name: { eq: $name } }) {
                items {
                    sku
                    ... on ConfigurableProduct { variants { product { sku } } configurable_options { values { label } } }
                    price { regularPrice { amount { value currency } } }
                }
            }
        }"#;

        let configurable = fixture.run(query, json!({ "name": "Configurable Product" }));
        let item = &configurable["data"]["products"]["items"][0];
        assert_eq!(item["sku"], "configurable");
        assert_eq!(item["variants"][1]["product"]["sku"], "simple2");
        assert_eq!(item["configurable_options"][0]["values"][0]["label"], "Red");
        assert_eq!(item["price"]["regularPrice"]["amount"]["currency"], "USD");

        let simple = fixture.run(query, json!({ "name": "Simple Product1" }));
        let item = &simple["data"]["products"]["items"][0];
        assert_eq!(item["sku"], "simple1");
        assert!(item.get("variants").is_none());
    }

    #[test]
    fn test_url_resolver_is_created_on_demand() {
        let mut fixture = Fixture::new();
        assert!(fixture.url_resolver.is_none());

        let result = fixture.run(r#"{ urlResolver(url: "no-route") { type id } }"#, json!({}));
        assert_eq!(result["data"]["urlResolver"], json!({ "type": "CMS_PAGE", "id": 1 }));
        assert!(fixture.url_resolver.is_some());

        let missing = fixture.run(r#"{ urlResolver(url: "nope.html") { id } }"#, json!({}));
        assert_eq!(missing["data"]["urlResolver"], Value::Null);
    }

    #[test]
    fn test_errors_are_reported_per_field() {
        let mut fixture = Fixture::new();
        let result = fixture.run(
            "{ category(id: 99) { id } cart { id } products(pageSize: 0) { total_count } }",
            json!({}),
        );

        assert_eq!(result["data"]["category"], Value::Null);
        assert_eq!(result["data"]["cart"], Value::Null);
        let messages: Vec<&str> = result["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|error| error["message"].as_str().unwrap())
            .collect();
        assert_eq!(
            messages,
            vec![
                "Category doesn't exist",
                "Cannot query field \"cart\" on type \"Query\".",
                "pageSize value must be greater than 0.",
            ]
        );
    }

    #[test]
    fn test_paging_arguments_at_integer_limits() {
        let mut fixture = Fixture::new();

        let huge_page = fixture.run(
            "{ products(pageSize: 9223372036854775807) { total_count items { sku } page_info { total_pages } } }",
            json!({}),
        );
        assert!(huge_page.get("errors").is_none(), "{}", huge_page);
        assert_eq!(huge_page["data"]["products"]["total_count"], 3);
        assert_eq!(huge_page["data"]["products"]["items"].as_array().unwrap().len(), 3);
        assert_eq!(huge_page["data"]["products"]["page_info"]["total_pages"], 1);

        let past_end = fixture.run(
            "{ products(pageSize: 9223372036854775807, currentPage: 9223372036854775807) { total_count } }",
            json!({}),
        );
        assert_eq!(past_end["data"]["products"], Value::Null);
        assert_eq!(
            past_end["errors"][0]["message"],
            "currentPage value 9223372036854775807 specified is greater than the 1 page(s) available."
        );

        let last_page = fixture.run(
            "{ products(pageSize: 2, currentPage: 2) { items { sku } } }",
            json!({}),
        );
        assert_eq!(last_page["data"]["products"]["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_selection_is_an_error() {
        let mut fixture = Fixture::new();
        let result = fixture.run("{ category(id: 4) { children } }", json!({}));
        assert_eq!(
            result["errors"][0]["message"],
            "Field \"children\" of type \"CategoryTree\" must have a selection of subfields."
        );
    }
}
