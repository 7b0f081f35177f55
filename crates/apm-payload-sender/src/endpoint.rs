// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::artifact::{ArtifactKind, TelemetryArtifact};

pub const INTAKE_V1_TRANSACTIONS: &str = "/v1/transactions";
pub const INTAKE_V1_ERRORS: &str = "/v1/errors";

/// Collector path for an artifact kind. The match is exhaustive, so adding a
/// kind without an intake path does not compile.
pub fn path_for(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Trace => INTAKE_V1_TRANSACTIONS,
        ArtifactKind::Error => INTAKE_V1_ERRORS,
    }
}

pub fn resolve(artifact: &TelemetryArtifact) -> &'static str {
    path_for(artifact.kind())
}
