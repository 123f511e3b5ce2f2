//! Which step belongs on the current page.

use crate::location::Location;
use crate::recording::Step;
use std::collections::HashSet;

/// What navigation re-entry should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    Activate { index: usize, revisit: bool },
    /// A later step's page was reached before step `position` was done.
    Prerequisite { position: i64, url: String },
    Completed,
    OffPath,
}

/// Decide what to do on arriving at `current`.
///
/// `steps` is the sorted view.
pub(crate) fn plan(steps: &[Step], completed: &HashSet<i64>, current: &Location) -> Plan {
    if let Some(index) = fast_path(steps, completed, current) {
        return forward(steps, completed, index);
    }

    let matching: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.location().matches(current))
        .map(|(i, _)| i)
        .collect();

    if matching.is_empty() {
        return if steps.iter().all(|s| completed.contains(&s.position)) {
            Plan::Completed
        } else {
            Plan::OffPath
        };
    }

    match matching
        .iter()
        .copied()
        .find(|i| !completed.contains(&steps[*i].position))
    {
        Some(index) => forward(steps, completed, index),
        // everything here is done: show the latest one for context
        None => Plan::Activate {
            index: matching[matching.len() - 1],
            revisit: true,
        },
    }
}

/// The next uncompleted step after the furthest completed one, if it lives here.
fn fast_path(steps: &[Step], completed: &HashSet<i64>, current: &Location) -> Option<usize> {
    let last_done = steps
        .iter()
        .filter(|s| completed.contains(&s.position))
        .map(|s| s.position)
        .max();
    let index = steps.iter().position(|s| {
        !completed.contains(&s.position) && last_done.map_or(true, |p| s.position > p)
    })?;
    steps[index].location().matches(current).then_some(index)
}

fn forward(steps: &[Step], completed: &HashSet<i64>, index: usize) -> Plan {
    let target = steps[index].position;
    match steps
        .iter()
        .find(|s| s.position < target && !completed.contains(&s.position))
    {
        Some(missing) => Plan::Prerequisite {
            position: missing.position,
            url: step_url(missing),
        },
        None => Plan::Activate {
            index,
            revisit: false,
        },
    }
}

/// Pages performing step `index` leads to: its link target and the next
/// step's page, whichever differ from where the step itself lives.
pub(crate) fn destinations(steps: &[Step], index: usize) -> Vec<Location> {
    let Some(step) = steps.get(index) else {
        return Vec::new();
    };
    let origin = step.location();
    let link = step
        .interaction
        .attributes
        .get("href")
        .and_then(|href| step.interaction.page_info.location().join(href));
    let next = steps.get(index + 1).map(Step::location);
    link.into_iter()
        .chain(next)
        .filter(|dest| !dest.matches(&origin))
        .collect()
}

/// Whether reaching `current` means step `index`, whose target was absent
/// because it navigates, has been carried out.
///
/// With a known destination only that destination counts. Without one, any
/// page the guide has not already passed through does.
pub(crate) fn arrived(steps: &[Step], index: usize, current: &Location) -> bool {
    if index >= steps.len() {
        return false;
    }
    let dests = destinations(steps, index);
    if !dests.is_empty() {
        return dests.iter().any(|d| d.matches(current));
    }
    !steps[..=index].iter().any(|s| s.location().matches(current))
}

/// Where to send the user for `step`: the recorded URL, else its path.
pub(crate) fn step_url(step: &Step) -> String {
    let info = &step.interaction.page_info;
    if info.url.trim().is_empty() {
        info.path.clone().unwrap_or_default()
    } else {
        info.url.clone()
    }
}
