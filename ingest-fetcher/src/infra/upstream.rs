// This file is part of hl-ingest.
// SPDX-License-Identifier: Apache-2.0

pub mod http;
