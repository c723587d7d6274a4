// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A virtual keyboard instrument. Notes trigger synthesized or sampled voices that are
//! routed through optional effects into a live monitor and a recorder.

pub mod audio;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod effects;
pub mod engine;
pub mod instrument;
pub mod notes;
pub mod playsync;
pub mod recording;
pub mod reverb;
pub mod samples;
pub mod source;
#[cfg(test)]
mod testutil;
