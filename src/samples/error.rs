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
use crate::audio::DecodeError;

/// Per-note sample failures. None of these are fatal: the note is dropped and playback
/// carries on.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("no sample mapped for note '{note}' on instrument '{instrument}'")]
    MissingSample { note: String, instrument: String },

    #[error("unable to load sample {location}: {source}")]
    SampleLoad {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode sample {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: DecodeError,
    },
}
