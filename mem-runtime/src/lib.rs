/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright 2018-2021 Clemens Lutz
 * Author: Clemens Lutz <lutzcle@cml.li>
 */

//! Host memory runtime support for DRAM stress workloads.
//!
//! Provides page-granular buffer allocation and hardware introspection for
//! benchmark drivers that generate memory traffic to be observed with
//! external profiling tools.

pub mod error;
pub mod runtime;
