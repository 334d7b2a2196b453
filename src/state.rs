// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::middleware::Interceptor;
use crate::proxy::Forwarder;

#[derive(Clone)]
pub struct AppState {
    pub interceptor: Arc<Interceptor>,
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new(interceptor: Interceptor, forwarder: Forwarder) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
            forwarder: Arc::new(forwarder),
        }
    }
}
