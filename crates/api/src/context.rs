use reftrack_products::Product;

/// Product authenticated by its secret key (`X-API-Key`) for this request.
///
/// Present on every conversion-report route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductContext {
    product: Product,
}

impl ProductContext {
    pub fn new(product: Product) -> Self {
        Self { product }
    }

    pub fn product(&self) -> &Product {
        &self.product
    }
}

/// The caller presented the configured admin key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AdminContext;
