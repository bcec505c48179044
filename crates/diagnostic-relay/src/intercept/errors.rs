// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::event::Event;
use crate::host::{ErrorListener, ErrorNotification};
use crate::intercept::guarded;
use crate::session::Shared;

/// Builds the error hub listener: one uncaught-error event per notification.
pub(crate) fn listener(shared: Arc<Shared>) -> ErrorListener {
    Arc::new(move |notification: &ErrorNotification| {
        guarded("uncaught error", || {
            let Some(capture) = shared.snapshot() else {
                return;
            };
            if !capture.config.capture_errors {
                return;
            }
            let event = Event::uncaught_error(
                &notification.message(),
                notification.stack(),
                shared.origin(),
            );
            shared.submit(capture.session, event);
        });
    })
}
