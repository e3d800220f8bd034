// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Translation of the deprecated reply-group format into per-rule wait counts.
//!
//! Reply group `p` (1-based) answers the `p`-th client message. With a
//! positive `ReceiveCount`, groups past it all start with the last counted
//! message. With `WaitToStart` off, the first group is sent on connect.

use crate::raw::RawDocument;
use serde_yaml::Value;

/// A legacy rule entry with the wait count its group implies.
pub(crate) struct GroupedEntry {
    pub entry: Value,
    pub wait_count: u64,
}

/// Flatten reply groups, in document order.
pub(crate) fn flatten(doc: RawDocument) -> Vec<GroupedEntry> {
    let wait_to_start = doc.wait_to_start.as_ref().is_some_and(|w| w.enabled());
    let receive_count = doc.receive_count.unwrap_or(0);

    let groups: Vec<Vec<Value>> = match (doc.replies, doc.messages) {
        (Some(replies), _) => replies.into_iter().map(|r| r.messages).collect(),
        (None, Some(messages)) => vec![messages],
        (None, None) => Vec::new(),
    };

    let mut out = Vec::new();
    for (pos, group) in (1u64..).zip(groups) {
        let wait_count = group_wait_count(pos, receive_count, wait_to_start);
        out.extend(
            group
                .into_iter()
                .map(|entry| GroupedEntry { entry, wait_count }),
        );
    }
    out
}

fn group_wait_count(position: u64, receive_count: u64, wait_to_start: bool) -> u64 {
    if position == 1 && !wait_to_start {
        return 0;
    }
    if receive_count > 0 {
        position.min(receive_count)
    } else {
        position
    }
}
