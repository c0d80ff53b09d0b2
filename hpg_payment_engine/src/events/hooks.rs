use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, TransactionSettledEvent};

/// The publishing ends handed to the APIs. Cheap to clone.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub transaction_settled_producer: Vec<EventProducer<TransactionSettledEvent>>,
}

pub struct EventHandlers {
    pub on_transaction_settled: Option<EventHandler<TransactionSettledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_transaction_settled = hooks.on_transaction_settled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_transaction_settled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_transaction_settled {
            result.transaction_settled_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per registered handler. Each runs until all of its producers have been dropped.
    pub fn start_handlers(self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(handler) = self.on_transaction_settled {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        tasks
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_transaction_settled: Option<Handler<TransactionSettledEvent>>,
}

impl EventHooks {
    pub fn on_transaction_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_settled = Some(Arc::new(f));
        self
    }
}
