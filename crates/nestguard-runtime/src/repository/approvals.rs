//! Approval request documents

use std::sync::Arc;

use nestguard_core::store::{collections, get_json, list_json, put_json};
use nestguard_core::{NestResult, ParentalApprovalRequest, Store};

#[derive(Clone)]
pub struct ApprovalRepository {
    store: Arc<dyn Store>,
}

impl ApprovalRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn save(&self, request: &ParentalApprovalRequest) -> NestResult<()> {
        put_json(self.store.as_ref(), collections::APPROVAL_REQUESTS, &request.id, request).await
    }

    pub async fn get(&self, request_id: &str) -> NestResult<Option<ParentalApprovalRequest>> {
        get_json(self.store.as_ref(), collections::APPROVAL_REQUESTS, request_id).await
    }

    pub async fn list_all(&self) -> NestResult<Vec<ParentalApprovalRequest>> {
        list_json(self.store.as_ref(), collections::APPROVAL_REQUESTS, None).await
    }
}
