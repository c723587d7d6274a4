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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const PROMPT: &str =
    "Command (instrument <name>, toggle <effect>, key <k>, freq <hz>, record, stop, save, quit): ";

/// A driver that reads commands from the keyboard, one per line.
#[derive(Default)]
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads a single command. Returns false once input is exhausted or a quit was sent.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "{}", PROMPT)?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            // End of input ends the session.
            send(events_tx, Event::Quit)?;
            return Ok(false);
        }

        if input.trim().is_empty() {
            return Ok(true);
        }

        match input.parse::<Event>() {
            Ok(event) => {
                let quit = event == Event::Quit;
                send(events_tx, event)?;
                Ok(!quit)
            }
            Err(e) => {
                warn!(input = input.trim(), err = %e, "Unrecognized input");
                Ok(true)
            }
        }
    }
}

fn send(events_tx: &Sender<Event>, event: Event) -> io::Result<()> {
    events_tx
        .blocking_send(event)
        .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}
