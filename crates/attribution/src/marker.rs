//! Attribution marker: what the referral redirect remembers about a visitor.

use reftrack_core::{AffiliateId, ProductId};
use reftrack_products::Product;

const SECONDS_PER_DAY: i64 = 86_400;

/// Values persisted client-side after a referral click, read back when the
/// merchant reports a conversion without an explicit affiliate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionMarker {
    pub affiliate_id: AffiliateId,
    pub product_id: ProductId,
    pub ref_code: String,
    pub duration_days: u32,
}

impl AttributionMarker {
    pub const AFFILIATE_ID: &'static str = "affiliate_id";
    pub const PRODUCT_ID: &'static str = "affiliate_product_id";
    pub const REF_CODE: &'static str = "affiliate_ref";

    pub fn max_age_seconds(&self) -> i64 {
        i64::from(self.duration_days) * SECONDS_PER_DAY
    }

    /// `(name, value)` pairs in a stable order.
    pub fn entries(&self) -> [(&'static str, String); 3] {
        [
            (Self::AFFILIATE_ID, self.affiliate_id.to_string()),
            (Self::PRODUCT_ID, self.product_id.to_string()),
            (Self::REF_CODE, self.ref_code.clone()),
        ]
    }
}

/// Product destination with `ref=<code>` appended to the query string.
///
/// `code` must already be a normalized affiliate code (URL-safe characters only).
pub fn landing_url(product: &Product, code: Option<&str>) -> String {
    let destination = product.destination_url();
    let Some(code) = code else {
        return destination;
    };

    let (base, fragment) = match destination.split_once('#') {
        Some((base, fragment)) => (base.to_string(), Some(fragment.to_string())),
        None => (destination, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!("{base}{separator}ref={code}");
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(&fragment);
    }
    url
}
