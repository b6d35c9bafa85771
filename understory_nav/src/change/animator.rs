// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::Duration;

use kurbo::Vec2;
use understory_view::ViewId;

use crate::arena::ControllerId;
use crate::bundle::Bundle;
use crate::change::{ChangeContext, ChangeHandler, ChangeStatus};

const KEY_ANIMATION: &str = "animation";
const KEY_DURATION: &str = "duration";
const KEY_REMOVES_FROM_ON_PUSH: &str = "removesFromViewOnPush";

/// Default length of an animated change.
const DEFAULT_ANIMATION_DURATION: Duration = Duration::from_millis(300);

/// Property animations an [`AnimatorChangeHandler`] can run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Animation {
    /// Cross-fade: the incoming view fades in, the outgoing view fades out when it leaves.
    #[default]
    Fade,
    /// Slide horizontally, towards the left on push and the right on pop.
    Horizontal,
    /// Slide the incoming view up on push, the outgoing view down on pop.
    Vertical,
}

impl Animation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "fade" => Some(Self::Fade),
            "horizontal" => Some(Self::Horizontal),
            "vertical" => Some(Self::Vertical),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Property {
    Alpha,
    TranslationX,
    TranslationY,
}

#[derive(Copy, Clone, Debug)]
struct Track {
    view: ViewId,
    property: Property,
    start: f64,
    end: f64,
}

#[derive(Clone, Debug, Default)]
struct Run {
    elapsed: Duration,
    tracks: Vec<Track>,
}

/// An asynchronous change that animates view properties over time.
///
/// The change stays pending until [`advance`](ChangeHandler::advance) has accumulated the
/// configured duration. A superseded push is cancelled: the outgoing view is reset and the
/// incoming view taken back out of the container. Completing immediately snaps to the end
/// state.
#[derive(Clone, Debug)]
pub struct AnimatorChangeHandler {
    animation: Animation,
    duration: Duration,
    removes_from_view_on_push: bool,
    run: Option<Run>,
}

impl Default for AnimatorChangeHandler {
    fn default() -> Self {
        Self::new(Animation::Fade)
    }
}

impl AnimatorChangeHandler {
    /// An animated change with the default duration that removes the outgoing view on push.
    pub fn new(animation: Animation) -> Self {
        Self {
            animation,
            duration: DEFAULT_ANIMATION_DURATION,
            removes_from_view_on_push: true,
            run: None,
        }
    }

    /// A cross-fade.
    pub fn fade() -> Self {
        Self::new(Animation::Fade)
    }

    /// A horizontal slide.
    pub fn horizontal() -> Self {
        Self::new(Animation::Horizontal)
    }

    /// A vertical slide.
    pub fn vertical() -> Self {
        Self::new(Animation::Vertical)
    }

    /// Set the animation length.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Keep the outgoing view on push, turning the incoming controller into an overlay.
    pub fn with_removes_from_view_on_push(mut self, removes: bool) -> Self {
        self.removes_from_view_on_push = removes;
        self
    }

    /// The animation this handler runs.
    pub fn animation(&self) -> Animation {
        self.animation
    }

    /// The animation length.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn tracks(&self, cx: &ChangeContext<'_>, to_added: bool) -> Vec<Track> {
        let views = cx.views();
        let mut tracks = Vec::new();
        let mut push = |view, property, start, end| {
            tracks.push(Track {
                view,
                property,
                start,
                end,
            });
        };
        let (from, to, is_push) = (cx.from(), cx.to(), cx.is_push());
        match self.animation {
            Animation::Fade => {
                if let Some(from) = from {
                    if !is_push || self.removes_from_view_on_push {
                        push(from, Property::Alpha, views.alpha(from), 0.0);
                    }
                }
                if let Some(to) = to {
                    let start = if to_added { 0.0 } else { views.alpha(to) };
                    push(to, Property::Alpha, start, 1.0);
                }
            }
            Animation::Horizontal => {
                if is_push {
                    if let Some(from) = from {
                        push(from, Property::TranslationX, 0.0, -views.bounds(from).width());
                    }
                    if let Some(to) = to {
                        push(to, Property::TranslationX, views.bounds(to).width(), 0.0);
                    }
                } else {
                    if let Some(from) = from {
                        push(from, Property::TranslationX, 0.0, views.bounds(from).width());
                    }
                    if let Some(to) = to {
                        // Start from wherever an aborted push left the outgoing view.
                        let from_left = from.map_or(0.0, |f| views.translation(f).x);
                        push(
                            to,
                            Property::TranslationX,
                            from_left - views.bounds(to).width(),
                            0.0,
                        );
                    }
                }
            }
            Animation::Vertical => {
                if is_push {
                    if let Some(to) = to {
                        push(to, Property::TranslationY, views.bounds(to).height(), 0.0);
                    }
                } else if let Some(from) = from {
                    push(from, Property::TranslationY, 0.0, views.bounds(from).height());
                }
            }
        }
        tracks
    }

    fn apply(cx: &mut ChangeContext<'_>, tracks: &[Track], progress: f64) {
        let views = cx.views_mut();
        for track in tracks {
            let value = track.start + (track.end - track.start) * progress;
            match track.property {
                Property::Alpha => views.set_alpha(track.view, value),
                Property::TranslationX => {
                    let t = views.translation(track.view);
                    views.set_translation(track.view, Vec2::new(value, t.y));
                }
                Property::TranslationY => {
                    let t = views.translation(track.view);
                    views.set_translation(track.view, Vec2::new(t.x, value));
                }
            }
        }
    }

    fn reset_from_view(&self, cx: &mut ChangeContext<'_>, from: ViewId) {
        let views = cx.views_mut();
        match self.animation {
            Animation::Fade => views.set_alpha(from, 1.0),
            Animation::Horizontal => {
                let t = views.translation(from);
                views.set_translation(from, Vec2::new(0.0, t.y));
            }
            Animation::Vertical => {}
        }
    }

    fn finish(&mut self, cx: &mut ChangeContext<'_>) {
        if let Some(run) = self.run.take() {
            Self::apply(cx, &run.tracks, 1.0);
        }
        let from = cx.from();
        if let Some(from) = from {
            if !cx.is_push() || self.removes_from_view_on_push {
                cx.remove_from_container(from);
            }
            if cx.is_push() {
                self.reset_from_view(cx, from);
            }
        }
    }
}

impl ChangeHandler for AnimatorChangeHandler {
    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus {
        let container = cx.container();
        let to_added = cx.to().is_some_and(|to| cx.views().parent(to).is_none());
        if let Some(to) = cx.to().filter(|_| to_added) {
            let index = match cx.from() {
                Some(from) if !cx.is_push() => cx.views().index_of_child(container, from),
                _ => None,
            };
            let views = cx.views_mut();
            match index {
                Some(index) => views.insert_child(container, index, to),
                None => views.add_child(container, to),
            };
        }

        let tracks = self.tracks(cx, to_added);
        Self::apply(cx, &tracks, 0.0);
        self.run = Some(Run {
            elapsed: Duration::ZERO,
            tracks,
        });
        if self.duration.is_zero() {
            self.finish(cx);
            return ChangeStatus::Completed;
        }
        ChangeStatus::Pending
    }

    fn advance(&mut self, cx: &mut ChangeContext<'_>, elapsed: Duration) -> ChangeStatus {
        let Some(run) = self.run.as_mut() else {
            return ChangeStatus::Completed;
        };
        run.elapsed += elapsed;
        if run.elapsed >= self.duration {
            self.finish(cx);
            return ChangeStatus::Completed;
        }
        let progress = run.elapsed.as_secs_f64() / self.duration.as_secs_f64();
        let tracks = run.tracks.clone();
        Self::apply(cx, &tracks, progress);
        ChangeStatus::Pending
    }

    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        self.finish(cx);
    }

    fn on_abort_push(
        &mut self,
        cx: &mut ChangeContext<'_>,
        _new_handler: &dyn ChangeHandler,
        _new_top: Option<ControllerId>,
    ) {
        self.run = None;
        if let Some(from) = cx.from() {
            self.reset_from_view(cx, from);
        }
        if let Some(to) = cx.to() {
            cx.remove_from_container(to);
        }
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(Self {
            run: None,
            ..self.clone()
        })
    }

    fn save_to_bundle(&self, bundle: &mut Bundle) {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Animation lengths are far below i64::MAX milliseconds."
        )]
        let millis = self.duration.as_millis() as i64;
        bundle
            .put_string(KEY_ANIMATION, self.animation.as_str())
            .put_int(KEY_DURATION, millis)
            .put_bool(KEY_REMOVES_FROM_ON_PUSH, self.removes_from_view_on_push);
    }

    fn restore_from_bundle(&mut self, bundle: &Bundle) {
        if let Some(animation) = bundle.get_string(KEY_ANIMATION).and_then(Animation::parse) {
            self.animation = animation;
        }
        if let Some(millis) = bundle.get_int(KEY_DURATION) {
            self.duration = Duration::from_millis(millis.max(0).unsigned_abs());
        }
        self.removes_from_view_on_push = bundle.get_bool(KEY_REMOVES_FROM_ON_PUSH).unwrap_or(true);
    }
}
