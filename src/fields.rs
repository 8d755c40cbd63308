use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::sleep;
use tracing::debug;

use crate::{
    env::{FieldSelector, FieldSink},
    tracker::{TrackingKind, ValueResolver},
};

const CLASS_PREFIX: &str = "js-rt-";
const ID_PREFIX: &str = "rt-";
const NAME_PREFIX: &str = "rt_";

/// One extra pass shortly after load catches late-rendered forms.
const LATE_FORM_DELAY: Duration = Duration::from_millis(500);

/// Writes the eight tracking values into form fields. One pass covers every
/// value kind across the three selector forms (class, id, name attribute).
#[derive(Clone)]
pub(crate) struct FieldSynchronizer {
    resolver: ValueResolver,
    fields: Arc<Mutex<dyn FieldSink>>,
    verbose: bool,
}

impl FieldSynchronizer {
    pub(crate) fn new(
        resolver: ValueResolver,
        fields: Arc<Mutex<dyn FieldSink>>,
        verbose: bool,
    ) -> Self {
        Self {
            resolver,
            fields,
            verbose,
        }
    }

    /// Run one pass. Writes are idempotent: fields already holding the target
    /// value are skipped. Returns the number of fields that changed.
    pub(crate) fn sync_once(&self) -> usize {
        let mut changed = 0;
        let mut fields = self.fields.lock().unwrap();

        for kind in TrackingKind::ALL {
            let value = self.resolver.resolve(kind);

            for selector in [
                FieldSelector::Class(format!("{CLASS_PREFIX}{kind}")),
                FieldSelector::Id(format!("{ID_PREFIX}{kind}")),
                FieldSelector::Name(format!("{NAME_PREFIX}{kind}")),
            ] {
                let filled = fields.fill(&selector, &value);
                if filled > 0 && self.verbose {
                    debug!(?selector, value, filled, "Updated form fields");
                }
                changed += filled;
            }
        }

        changed
    }
}

/// Timing of the bounded synchronization schedule: one immediate pass, one
/// pass after [`LATE_FORM_DELAY`], then `ticks` periodic passes, after which
/// the schedule is over for this page load.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SyncSchedule {
    pub(crate) initial_delay: Duration,
    pub(crate) interval: Duration,
    pub(crate) ticks: u32,
}

impl SyncSchedule {
    pub(crate) fn new(interval: Duration, duration: Duration) -> Self {
        let ticks = if interval.is_zero() {
            0
        } else {
            (duration.as_millis() / interval.as_millis()) as u32
        };

        Self {
            initial_delay: LATE_FORM_DELAY,
            interval,
            ticks,
        }
    }
}

/// Drive the schedule to completion, then stop permanently.
pub(crate) async fn run_schedule(sync: FieldSynchronizer, schedule: SyncSchedule) {
    sync.sync_once();

    sleep(schedule.initial_delay).await;
    sync.sync_once();

    for _ in 0..schedule.ticks {
        sleep(schedule.interval).await;
        sync.sync_once();
    }

    debug!("Stopped periodic field updates");
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::Utc;

    use super::{FieldSynchronizer, SyncSchedule};
    use crate::{
        env::{ManualClock, MemoryCookieJar, MemoryField, MemoryFieldSink, MemoryPage},
        storage::CookieStore,
        tracker::ValueResolver,
    };

    #[test]
    fn tick_count_is_duration_over_interval() {
        let schedule = SyncSchedule::new(Duration::from_millis(500), Duration::from_secs(10));
        assert_eq!(schedule.ticks, 20);
        assert_eq!(schedule.interval, Duration::from_millis(500));
    }

    #[test]
    fn zero_interval_schedules_no_ticks() {
        let schedule = SyncSchedule::new(Duration::ZERO, Duration::from_secs(10));
        assert_eq!(schedule.ticks, 0);
    }

    fn synchronizer(fields: Arc<Mutex<MemoryFieldSink>>) -> FieldSynchronizer {
        let clock = Arc::new(ManualClock::at(Utc::now()));
        let jar = Arc::new(Mutex::new(MemoryCookieJar::new(clock.clone())));
        let store = CookieStore::new(jar, clock);
        let page = Arc::new(MemoryPage::at(
            "https://shop.example.com/?utm_source=newsletter",
        ));
        let resolver = ValueResolver::new(page, store, "rt_".to_owned());
        FieldSynchronizer::new(resolver, fields, false)
    }

    #[test]
    fn one_pass_covers_class_id_and_name_targets() {
        let fields = Arc::new(Mutex::new(MemoryFieldSink::default()));
        {
            let mut sink = fields.lock().unwrap();
            sink.push(MemoryField::with_class("js-rt-source"));
            sink.push(MemoryField::with_id("rt-source"));
            sink.push(MemoryField::with_name("rt_source"));
            sink.push(MemoryField::with_id("unrelated"));
        }

        let sync = synchronizer(fields.clone());
        sync.sync_once();

        let sink = fields.lock().unwrap();
        let values: Vec<_> = sink.fields().iter().map(|f| f.value.clone()).collect();
        assert_eq!(values, ["newsletter", "newsletter", "newsletter", ""]);
    }

    #[test]
    fn repeated_passes_are_idempotent() {
        let fields = Arc::new(Mutex::new(MemoryFieldSink::default()));
        fields
            .lock()
            .unwrap()
            .push(MemoryField::with_id("rt-source"));

        let sync = synchronizer(fields.clone());
        let first = sync.sync_once();
        let second = sync.sync_once();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(fields.lock().unwrap().mutations(), 1);
    }
}
