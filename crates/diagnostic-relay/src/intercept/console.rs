// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::event::Event;
use crate::host::{ConsoleArg, ConsoleMethod, ConsoleSink};
use crate::intercept::guarded;
use crate::session::Shared;

pub(crate) struct ConsoleWrapper {
    method: ConsoleMethod,
    original: Arc<dyn ConsoleSink>,
    shared: Arc<Shared>,
}

impl ConsoleWrapper {
    pub(crate) fn new(
        method: ConsoleMethod,
        original: Arc<dyn ConsoleSink>,
        shared: Arc<Shared>,
    ) -> Self {
        ConsoleWrapper {
            method,
            original,
            shared,
        }
    }

    fn capture(&self, args: &[ConsoleArg]) {
        let Some(capture) = self.shared.snapshot() else {
            return;
        };
        let severity = self.method.severity();
        if !capture.config.severity_enabled(severity) {
            return;
        }
        let payload = args.iter().map(ConsoleArg::to_payload).collect();
        let stack = args.first().and_then(ConsoleArg::stack);
        let event = Event::structured_log(severity, payload, stack, self.shared.origin());
        self.shared.submit(capture.session, event);
    }
}

impl ConsoleSink for ConsoleWrapper {
    fn call(&self, args: &[ConsoleArg]) {
        self.original.call(args);
        guarded("console call", || self.capture(args));
    }
}
