//! Component J: the IDLE notifier (spec.md §4.J).
//!
//! spec.md's original notifier is event-driven: the store pushes
//! `rowAdded`/`rowDeleted`/`rowModified`/`tableReload` straight into the
//! session's subscription sink. `store::Folder` has no such sink — it is a
//! pull-only interface (`messages()` snapshots the current state) — so this
//! gateway's IDLE instead polls on an interval and feeds each snapshot
//! through the same [`MailboxView::refresh`] reconciliation SELECT/NOOP/
//! CHECK already use, which already derives the right `FETCH`/`EXPUNGE`/
//! `EXISTS`/`RECENT` lines from a before/after diff. Recorded as an Open
//! Question decision in `DESIGN.md`.

use std::time::Duration;

use store::Folder;

use crate::mailbox_view::MailboxView;

/// How often an idling session re-polls its selected folder. spec.md
/// doesn't specify a push-latency bound, so this just needs to be well
/// inside clients' usual `IDLE` keepalive/NOOP expectations.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One polling tick: reconcile `view` against the folder's current state
/// and return whatever untagged lines the diff produced (empty if nothing
/// changed since the last tick).
pub async fn tick(folder: &dyn Folder, view: &mut MailboxView) -> Vec<String> {
    view.refresh(folder, false).await
}
