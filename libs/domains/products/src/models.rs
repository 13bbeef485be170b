use docstore::{FieldMap, FieldReader, Record, StoreResult, Stored};
use serde::{Deserialize, Serialize};

use crate::error::{ProductError, ProductResult};

/// Collection holding every product document
pub const COLLECTION: &str = "products";

/// Stored field names
pub mod fields {
    pub const CODE: &str = "code";
    pub const NAME: &str = "name";
    pub const PURCHASE_PRICE: &str = "purchase_price";
    pub const SALE_PRICE: &str = "sale_price";
    pub const MINIMUM_STOCK: &str = "minimum_stock";
    pub const IMAGE_URL: &str = "image_url";
    pub const BARCODE_VALUE: &str = "barcode_value";
    pub const IMAGE_RECOGNITION_DATA: &str = "image_recognition_data";
    pub const COMPANY_ID: &str = "company_id";
    pub const BRAND_ID: &str = "brand_id";
    pub const PRODUCT_CATEGORY_ID: &str = "product_category_id";
}

/// Product entity
///
/// `code` is the caller-assigned business key, unique across the store and
/// immutable once created. Brand, category and company references are
/// opaque identifiers owned by other domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub purchase_price: f64,
    pub sale_price: f64,
    pub minimum_stock: i64,
    pub image_url: String,
    pub barcode_value: String,
    /// JSON blob from the last recognition run
    pub image_recognition_data: String,
    pub company_id: String,
    pub brand_id: String,
    pub product_category_id: String,
}

pub type StoredProduct = Stored<Product>;

impl Product {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_prices(mut self, purchase_price: f64, sale_price: f64) -> Self {
        self.purchase_price = purchase_price;
        self.sale_price = sale_price;
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode_value = barcode.into();
        self
    }

    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = company_id.into();
        self
    }

    pub fn validate(&self) -> ProductResult<()> {
        if self.code.trim().is_empty() {
            return Err(ProductError::Validation("code must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ProductError::Validation("name must not be empty".to_string()));
        }
        validate_price(fields::PURCHASE_PRICE, self.purchase_price)?;
        validate_price(fields::SALE_PRICE, self.sale_price)?;
        if self.minimum_stock < 0 {
            return Err(ProductError::Validation(
                "minimum_stock must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_price(field: &str, price: f64) -> ProductResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(ProductError::Validation(format!(
            "{} must be a non-negative number",
            field
        )));
    }
    Ok(())
}

impl Record for Product {
    const FIELDS: &'static [&'static str] = &[
        fields::CODE,
        fields::NAME,
        fields::PURCHASE_PRICE,
        fields::SALE_PRICE,
        fields::MINIMUM_STOCK,
        fields::IMAGE_URL,
        fields::BARCODE_VALUE,
        fields::IMAGE_RECOGNITION_DATA,
        fields::COMPANY_ID,
        fields::BRAND_ID,
        fields::PRODUCT_CATEGORY_ID,
    ];

    fn encode(&self, map: &mut FieldMap) {
        map.string(fields::CODE, &self.code)
            .string(fields::NAME, &self.name)
            .number(fields::PURCHASE_PRICE, self.purchase_price)
            .number(fields::SALE_PRICE, self.sale_price)
            .integer(fields::MINIMUM_STOCK, self.minimum_stock)
            .string(fields::IMAGE_URL, &self.image_url)
            .string(fields::BARCODE_VALUE, &self.barcode_value)
            .string(fields::IMAGE_RECOGNITION_DATA, &self.image_recognition_data)
            .string(fields::COMPANY_ID, &self.company_id)
            .string(fields::BRAND_ID, &self.brand_id)
            .string(fields::PRODUCT_CATEGORY_ID, &self.product_category_id);
    }

    fn decode(reader: &FieldReader<'_>) -> StoreResult<Self> {
        Ok(Self {
            code: reader.string(fields::CODE)?,
            name: reader.string(fields::NAME)?,
            purchase_price: reader.number(fields::PURCHASE_PRICE)?,
            sale_price: reader.number(fields::SALE_PRICE)?,
            minimum_stock: reader.integer(fields::MINIMUM_STOCK)?,
            image_url: reader.string(fields::IMAGE_URL)?,
            barcode_value: reader.string(fields::BARCODE_VALUE)?,
            image_recognition_data: reader.string(fields::IMAGE_RECOGNITION_DATA)?,
            company_id: reader.string(fields::COMPANY_ID)?,
            brand_id: reader.string(fields::BRAND_ID)?,
            product_category_id: reader.string(fields::PRODUCT_CATEGORY_ID)?,
        })
    }
}

/// Partial update of ordinary product fields; `None` leaves the stored value alone.
///
/// The business code is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub purchase_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub minimum_stock: Option<i64>,
    pub image_url: Option<String>,
    pub barcode_value: Option<String>,
    pub image_recognition_data: Option<String>,
    pub company_id: Option<String>,
    pub brand_id: Option<String>,
    pub product_category_id: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.to_fields().is_empty()
    }

    pub fn validate(&self) -> ProductResult<()> {
        if self.is_empty() {
            return Err(ProductError::Validation("patch has no fields".to_string()));
        }
        if let Some(ref name) = self.name {
            if name.trim().is_empty() {
                return Err(ProductError::Validation("name must not be empty".to_string()));
            }
        }
        if let Some(price) = self.purchase_price {
            validate_price(fields::PURCHASE_PRICE, price)?;
        }
        if let Some(price) = self.sale_price {
            validate_price(fields::SALE_PRICE, price)?;
        }
        if matches!(self.minimum_stock, Some(n) if n < 0) {
            return Err(ProductError::Validation(
                "minimum_stock must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Only the fields that are set
    pub fn to_fields(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.optional_string(fields::NAME, self.name.as_deref())
            .optional_string(fields::IMAGE_URL, self.image_url.as_deref())
            .optional_string(fields::BARCODE_VALUE, self.barcode_value.as_deref())
            .optional_string(
                fields::IMAGE_RECOGNITION_DATA,
                self.image_recognition_data.as_deref(),
            )
            .optional_string(fields::COMPANY_ID, self.company_id.as_deref())
            .optional_string(fields::BRAND_ID, self.brand_id.as_deref())
            .optional_string(
                fields::PRODUCT_CATEGORY_ID,
                self.product_category_id.as_deref(),
            );
        if let Some(price) = self.purchase_price {
            map.number(fields::PURCHASE_PRICE, price);
        }
        if let Some(price) = self.sale_price {
            map.number(fields::SALE_PRICE, price);
        }
        if let Some(stock) = self.minimum_stock {
            map.integer(fields::MINIMUM_STOCK, stock);
        }
        map
    }
}
