//! Shared fixture: a small screen component with observable lifecycle
//! events, a retained ticker, and a saved-state note.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use trellis_core::context::ComponentContext;
use trellis_core::instance_keeper::RetainedInstance;
use trellis_core::value_cell::Subscription;
use trellis_testing::StateLog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Config {
    Home,
    Details { id: u32 },
}

impl Config {
    pub fn label(&self) -> String {
        match self {
            Self::Home => "home".to_owned(),
            Self::Details { id } => format!("details-{id}"),
        }
    }
}

/// Counters shared between a test and every [`Ticker`] it creates.
#[derive(Clone, Default)]
pub struct TickerStats {
    pub created: Rc<Cell<usize>>,
    pub disposed: Rc<Cell<usize>>,
}

/// Retained instance tracking how often it is created and disposed.
pub struct Ticker {
    stats: TickerStats,
}

impl Ticker {
    pub fn new(stats: TickerStats) -> Self {
        stats.created.set(stats.created.get() + 1);
        Self { stats }
    }
}

impl RetainedInstance for Ticker {
    fn on_destroy(&self) {
        self.stats.disposed.set(self.stats.disposed.get() + 1);
    }
}

pub struct Screen {
    pub config: Config,
    pub context: ComponentContext,
    /// Snapshot left by the previous incarnation, if any.
    pub restored_note: Option<String>,
    pub ticker: Rc<Ticker>,
    _lifecycle_events: Subscription,
}

/// Component factory over [`Screen`]; every screen logs its lifecycle
/// transitions as `<label>:<State>`, keeps a retained [`Ticker`] and
/// registers a `note` state supplier derived from its configuration.
pub fn screen_factory(
    log: StateLog,
    stats: TickerStats,
) -> impl Fn(Config, ComponentContext) -> Screen {
    move |config, context| {
        let restored_note = context
            .state_keeper()
            .consume("note")
            .expect("state keeper alive during construction")
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        {
            let label = config.label();
            context
                .state_keeper()
                .register("note", move || Ok(format!("note-from-{label}").into_bytes()))
                .expect("state keeper alive during construction");
        }
        let ticker = context
            .instance_keeper()
            .get_or_create("ticker", {
                let stats = stats.clone();
                move || Ticker::new(stats)
            })
            .expect("instance keeper alive during construction");

        let label = config.label();
        let events = log.clone();
        let subscription = context
            .lifecycle()
            .subscribe(move |state| events.push(format!("{label}:{state:?}")));

        Screen {
            config,
            context,
            restored_note,
            ticker,
            _lifecycle_events: subscription,
        }
    }
}
