//! DisplayBoard - 表示位置のモデル（ResolutionSink 実装）
//!
//! sealed 値を表示している location のテキストを置き換えます。
//! location が tooltip グループに属している場合は、グループ全体の文字列を
//! 新しいタイムスタンプで coalescer に再投入して tooltip を更新します。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coalescer::TaskCoalescer;
use crate::domain::{LocationKey, ResolvedValue, SubmitOptions, Target, TargetKey};
use crate::ports::{Clock, ResolutionSink, TargetEffect};

/// One display location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub text: String,
    pub group: Option<TargetKey>,
    pub resolved: bool,
}

struct Group {
    target: Target,
    members: Vec<LocationKey>,
}

#[derive(Default)]
struct BoardState {
    locations: BTreeMap<LocationKey, Location>,
    groups: HashMap<TargetKey, Group>,
    last_stamp: u64,
}

pub struct DisplayBoard<E> {
    coalescer: TaskCoalescer<E>,
    clock: Arc<dyn Clock>,
    state: Mutex<BoardState>,
}

impl<E: TargetEffect> DisplayBoard<E> {
    pub fn new(coalescer: TaskCoalescer<E>, clock: Arc<dyn Clock>) -> Self {
        Self {
            coalescer,
            clock,
            state: Mutex::new(BoardState::default()),
        }
    }

    /// Register a tooltip target that aggregates several locations.
    pub fn define_group(&self, target: Target) {
        let mut state = self.lock();
        state.groups.entry(target.key.clone()).or_insert(Group {
            target,
            members: Vec::new(),
        });
    }

    /// Show `placeholder` at `location` until its value is resolved.
    pub fn place(
        &self,
        location: impl Into<LocationKey>,
        placeholder: impl Into<String>,
        group: Option<TargetKey>,
    ) {
        let location = location.into();
        let mut state = self.lock();
        if let Some(key) = &group {
            let group = state.groups.entry(key.clone()).or_insert_with(|| Group {
                target: Target::from(key.clone()),
                members: Vec::new(),
            });
            if !group.members.contains(&location) {
                group.members.push(location.clone());
            }
        }
        state.locations.insert(
            location,
            Location {
                text: placeholder.into(),
                group,
                resolved: false,
            },
        );
    }

    pub fn location(&self, location: &LocationKey) -> Option<Location> {
        self.lock().locations.get(location).cloned()
    }

    pub fn text_of(&self, location: &LocationKey) -> Option<String> {
        self.lock()
            .locations
            .get(location)
            .map(|location| location.text.clone())
    }

    /// Aggregated tooltip text of a group (member texts, one per line).
    pub fn group_text(&self, group: &TargetKey) -> Option<String> {
        let state = self.lock();
        Self::aggregate(&state, group)
    }

    pub fn unresolved(&self) -> Vec<LocationKey> {
        self.lock()
            .locations
            .iter()
            .filter(|(_, location)| !location.resolved)
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn aggregate(state: &BoardState, group: &TargetKey) -> Option<String> {
        let group = state.groups.get(group)?;
        let lines: Vec<&str> = group
            .members
            .iter()
            .filter_map(|member| state.locations.get(member))
            .map(|location| location.text.as_str())
            .collect();
        Some(lines.join("\n"))
    }

    /// Strictly increasing stamp so every refresh supersedes the previous one.
    fn next_stamp(state: &mut BoardState, now: u64) -> u64 {
        state.last_stamp = now.max(state.last_stamp + 1);
        state.last_stamp
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<E: TargetEffect> ResolutionSink for DisplayBoard<E> {
    fn apply(&self, location: &LocationKey, value: &ResolvedValue) {
        let refresh = {
            let mut state = self.lock();
            let Some(entry) = state.locations.get_mut(location) else {
                debug!(%location, "resolved value for unknown location");
                return;
            };
            entry.text = value.data.clone();
            entry.resolved = true;
            let Some(group) = entry.group.clone() else {
                return;
            };
            let text = Self::aggregate(&state, &group).unwrap_or_default();
            let target = state.groups.get(&group).map(|g| g.target.clone());
            let stamp = Self::next_stamp(&mut state, self.clock.now_millis());
            target.map(|target| (target, stamp, text))
        };

        // coalescer のロックを取るので board のロックは外してから
        if let Some((target, stamp, text)) = refresh {
            debug!(group = %target.key, stamp, "refreshing tooltip");
            self.coalescer.submit(
                [target],
                SubmitOptions::default().with_timestamp(stamp).with_text(text),
            );
        }
    }
}
