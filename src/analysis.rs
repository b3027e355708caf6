// SPDX-License-Identifier: BSD-3-Clause
pub mod datalog;
pub mod dispatch;
pub mod pointer;
pub mod relations;
pub mod rules;
