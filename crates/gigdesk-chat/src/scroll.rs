use uuid::Uuid;

/// What the message list should do with its scroll position after a render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    /// Older messages were inserted above: shift down by `offset` so the
    /// previously visible message stays put.
    Restore { offset: f64 },
    /// A new message landed at the bottom.
    ToBottom,
    Stay,
}

/// Keeps the viewport anchored across history backfills.
///
/// Works on content heights rather than message counts, so variable-height
/// messages (images, voice notes) do not make the view jump.
#[derive(Debug, Default)]
pub struct ScrollAnchor {
    height_before_backfill: Option<f64>,
    last_id: Option<Uuid>,
}

impl ScrollAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call right before a backfill is requested.
    pub fn before_backfill(&mut self, content_height: f64) {
        self.height_before_backfill = Some(content_height);
    }

    /// Call after the list re-rendered with `last_id` as its newest message.
    pub fn after_render(&mut self, content_height: f64, last_id: Option<Uuid>) -> ScrollAction {
        let previous_last = std::mem::replace(&mut self.last_id, last_id);

        if let Some(before) = self.height_before_backfill.take() {
            let offset = content_height - before;
            return if offset > 0.0 {
                ScrollAction::Restore { offset }
            } else {
                ScrollAction::Stay
            };
        }

        if last_id.is_some() && last_id != previous_last {
            ScrollAction::ToBottom
        } else {
            ScrollAction::Stay
        }
    }
}
