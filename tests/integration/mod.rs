// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod api_test;
pub mod credential_retry_test;
pub mod exhausted_retries_test;
pub mod helpers;
pub mod pipeline_test;
pub mod shutdown_test;
