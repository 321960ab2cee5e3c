use crate::correlator::Correlator;
use jsonwebtoken::DecodingKey;
use std::sync::Arc;
use types::product::ProductRegistry;

#[derive(Clone)]
pub struct AppState {
    pub correlator: Arc<Correlator>,
    pub products: Arc<ProductRegistry>,
    pub decoding_key: Arc<DecodingKey>,
}

impl AppState {
    pub fn new(
        correlator: Arc<Correlator>,
        products: Arc<ProductRegistry>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            correlator,
            products,
            decoding_key: Arc::new(DecodingKey::from_secret(jwt_secret.as_bytes())),
        }
    }
}
