// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

pub mod config;
pub mod error;
pub mod maintenance;
