/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Capability polled at every suspension point to decide whether the batch
/// must stop.
///
/// A non-`None` reason halts the batch cooperatively: no new HTTP request is
/// issued, in-flight tasks observe the signal at their next suspension point,
/// and the batch returns an empty result list rather than an error.
pub trait Interrupter: Send + Sync {
    /// Returns the reason the batch must stop, or `None` to keep going.
    fn reason(&self) -> Option<String>;
}

impl<F> Interrupter for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn reason(&self) -> Option<String> {
        (self)()
    }
}

/// An [`Interrupter`] that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupted;

impl Interrupter for NeverInterrupted {
    fn reason(&self) -> Option<String> {
        None
    }
}
