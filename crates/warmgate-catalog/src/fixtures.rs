// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fixed catalog served by the reference application.
//!
//! ```text
//! 1 Root Catalog
//! └── 2 Default Category
//!     ├── 3 Category 1
//!     │   └── 4 Category 1.1        simple1, configurable
//!     │       └── 5 Category 1.1.1  simple2
//!     └── 6 Category 2              simple2
//! ```

/// A node of the category tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// Entity id.
    pub id: i64,
    /// Parent id, `None` for the root.
    pub parent_id: Option<i64>,
    /// Display name.
    pub name: &'static str,
    /// URL segment.
    pub url_key: &'static str,
    /// Full URL path without suffix.
    pub url_path: &'static str,
    /// Slash separated ids from the root.
    pub path: &'static str,
    /// Depth, root is 0.
    pub level: i64,
    /// Sort order among siblings.
    pub position: i64,
    /// Directly assigned products.
    pub product_ids: &'static [i64],
}

/// A sellable product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Product {
    /// Entity id.
    pub id: i64,
    /// Stock keeping unit.
    pub sku: &'static str,
    /// Display name.
    pub name: &'static str,
    /// `simple` or `configurable`.
    pub type_id: &'static str,
    /// URL segment.
    pub url_key: &'static str,
    /// Regular price in USD.
    pub price: f64,
    /// Child products of a configurable product.
    pub variant_ids: &'static [i64],
}

/// A storefront URL mapped to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlRewrite {
    /// Request path without leading slash.
    pub request_path: &'static str,
    /// `CATEGORY`, `PRODUCT` or `CMS_PAGE`.
    pub entity_type: &'static str,
    /// Target entity id.
    pub entity_id: i64,
}

pub(crate) const CATEGORIES: &[Category] = &[
    Category {
        id: 1,
        parent_id: None,
        name: "Root Catalog",
        url_key: "root-catalog",
        url_path: "root-catalog",
        path: "1",
        level: 0,
        position: 0,
        product_ids: &[],
    },
    Category {
        id: 2,
        parent_id: Some(1),
        name: "Default Category",
        url_key: "default-category",
        url_path: "default-category",
        path: "1/2",
        level: 1,
        position: 1,
        product_ids: &[],
    },
    Category {
        id: 3,
        parent_id: Some(2),
        name: "Category 1",
        url_key: "category-1",
        url_path: "category-1",
        path: "1/2/3",
        level: 2,
        position: 1,
        product_ids: &[],
    },
    Category {
        id: 4,
        parent_id: Some(3),
        name: "Category 1.1",
        url_key: "category-1-1",
        url_path: "category-1/category-1-1",
        path: "1/2/3/4",
        level: 3,
        position: 1,
        product_ids: &[1, 3],
    },
    Category {
        id: 5,
        parent_id: Some(4),
        name: "Category 1.1.1",
        url_key: "category-1-1-1",
        url_path: "category-1/category-1-1/category-1-1-1",
        path: "1/2/3/4/5",
        level: 4,
        position: 1,
        product_ids: &[2],
    },
    Category {
        id: 6,
        parent_id: Some(2),
        name: "Category 2",
        url_key: "category-2",
        url_path: "category-2",
        path: "1/2/6",
        level: 2,
        position: 2,
        product_ids: &[2],
    },
];

pub(crate) const PRODUCTS: &[Product] = &[
    Product {
        id: 1,
        sku: "simple1",
        name: "Simple Product1",
        type_id: "simple",
        url_key: "simple-product1",
        price: 10.0,
        variant_ids: &[],
    },
    Product {
        id: 2,
        sku: "simple2",
        name: "Simple Product2",
        type_id: "simple",
        url_key: "simple-product2",
        price: 20.0,
        variant_ids: &[],
    },
    Product {
        id: 3,
        sku: "configurable",
        name: "Configurable Product",
        type_id: "configurable",
        url_key: "configurable-product",
        price: 30.0,
        variant_ids: &[1, 2],
    },
];

pub(crate) const URL_REWRITES: &[UrlRewrite] = &[
    UrlRewrite {
        request_path: "no-route",
        entity_type: "CMS_PAGE",
        entity_id: 1,
    },
    UrlRewrite {
        request_path: "category-1.html",
        entity_type: "CATEGORY",
        entity_id: 3,
    },
    UrlRewrite {
        request_path: "category-1/category-1-1.html",
        entity_type: "CATEGORY",
        entity_id: 4,
    },
    UrlRewrite {
        request_path: "category-2.html",
        entity_type: "CATEGORY",
        entity_id: 6,
    },
    UrlRewrite {
        request_path: "simple-product1.html",
        entity_type: "PRODUCT",
        entity_id: 1,
    },
    UrlRewrite {
        request_path: "simple-product2.html",
        entity_type: "PRODUCT",
        entity_id: 2,
    },
    UrlRewrite {
        request_path: "configurable-product.html",
        entity_type: "PRODUCT",
        entity_id: 3,
    },
];

/// Category by id.
pub fn category(id: i64) -> Option<&'static Category> {
    CATEGORIES.iter().find(|category| category.id == id)
}

/// Direct children of `parent_id`, by position.
pub fn children(parent_id: i64) -> Vec<&'static Category> {
    let mut children: Vec<_> = CATEGORIES
        .iter()
        .filter(|category| category.parent_id == Some(parent_id))
        .collect();
    children.sort_by_key(|category| category.position);
    children
}

/// Product by id.
pub fn product(id: i64) -> Option<&'static Product> {
    PRODUCTS.iter().find(|product| product.id == id)
}

/// URL rewrite for `request_path`, ignoring a leading slash.
pub fn url_rewrite(request_path: &str) -> Option<&'static UrlRewrite> {
    let request_path = request_path.trim_start_matches('/');
    URL_REWRITES
        .iter()
        .find(|rewrite| rewrite.request_path == request_path)
}
