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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, warn};

/// Priority used for audio threads when CHOPOGY_THREAD_PRIORITY is unset.
const DEFAULT_AUDIO_THREAD_PRIORITY: u8 = 70;

/// Reads CHOPOGY_THREAD_PRIORITY (0-99). Out of range or unparseable values
/// fall back to the default.
pub fn audio_thread_priority() -> Option<ThreadPriorityValue> {
    let priority = parse_priority(std::env::var("CHOPOGY_THREAD_PRIORITY").ok().as_deref());
    ThreadPriorityValue::try_from(priority).ok()
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_AUDIO_THREAD_PRIORITY)
}

pub(crate) fn env_flag(name: &str) -> bool {
    flag_value(std::env::var(name).ok().as_deref())
}

fn flag_value(value: Option<&str>) -> bool {
    value
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether audio threads should try SCHED_FIFO.
/// Enabled unless CHOPOGY_DISABLE_RT_AUDIO is set.
pub fn rt_audio_enabled() -> bool {
    !env_flag("CHOPOGY_DISABLE_RT_AUDIO")
}

/// Raises the priority of the calling thread. Failures are logged and
/// otherwise ignored; most desktop setups refuse realtime scheduling.
pub fn promote_current_thread(priority: Option<ThreadPriorityValue>, rt_audio: bool) {
    let Some(priority) = priority else {
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        debug!(error = %e, "Unable to raise audio thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => debug!("Enabled RT SCHED_FIFO for audio thread"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for audio thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;
}
