use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    bson::Document,
    cmap::{Connection, ConnectionPool},
    error::{ErrorKind, Result},
    options::ServerAddress,
};

/// What a mock connection does with a request.
#[derive(Clone, Debug)]
pub(crate) enum MockResponse {
    /// Reply with the given document.
    Reply(Document),

    /// Reply with raw bytes that may not be a valid document.
    Raw(Vec<u8>),

    /// Fail the exchange with an I/O error.
    Fail(io::ErrorKind),

    /// Never reply.
    Hang,
}

/// What the mock pool does when a connection is requested.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) enum CheckoutBehavior {
    #[default]
    Ready,
    Hang,
    Fail,
}

type Handler = dyn Fn(&ServerAddress, &Document) -> MockResponse + Send + Sync;

/// A pool of in-memory connections that answer requests with a handler and record what happens
/// to every connection they hand out.
#[derive(Clone)]
pub(crate) struct MockPool {
    state: Arc<MockState>,
}

struct MockState {
    handler: Box<Handler>,
    checkout: CheckoutBehavior,
    sent: Mutex<Vec<(ServerAddress, Document)>>,
    checked_out: AtomicUsize,
    checked_in: AtomicUsize,
    closed: AtomicUsize,
}

impl MockPool {
    pub(crate) fn new(
        handler: impl Fn(&ServerAddress, &Document) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        Self::with_checkout(CheckoutBehavior::Ready, handler)
    }

    pub(crate) fn with_checkout(
        checkout: CheckoutBehavior,
        handler: impl Fn(&ServerAddress, &Document) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Arc::new(MockState {
                handler: Box::new(handler),
                checkout,
                sent: Mutex::new(Vec::new()),
                checked_out: AtomicUsize::new(0),
                checked_in: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// A pool whose connections answer every request with `reply`.
    pub(crate) fn replying(reply: Document) -> Self {
        Self::new(move |_, _| MockResponse::Reply(reply.clone()))
    }

    /// The requests sent so far, with `$db` included.
    pub(crate) fn sent(&self) -> Vec<(ServerAddress, Document)> {
        self.state.sent.lock().unwrap().clone()
    }

    pub(crate) fn checked_out(&self) -> usize {
        self.state.checked_out.load(Ordering::SeqCst)
    }

    pub(crate) fn checked_in(&self) -> usize {
        self.state.checked_in.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockConnection {
    address: ServerAddress,
    state: Arc<MockState>,
}

impl Connection for MockConnection {
    async fn send_and_receive(&mut self, message: Vec<u8>) -> Result<Vec<u8>> {
        let request = Document::from_reader(message.as_slice())?;
        self.state
            .sent
            .lock()
            .unwrap()
            .push((self.address.clone(), request.clone()));

        let response = (self.state.handler)(&self.address, &request);
        match response {
            MockResponse::Reply(reply) => {
                let mut bytes = Vec::new();
                reply.to_writer(&mut bytes)?;
                Ok(bytes)
            }
            MockResponse::Raw(bytes) => Ok(bytes),
            MockResponse::Fail(kind) => Err(ErrorKind::from(kind).into()),
            MockResponse::Hang => std::future::pending().await,
        }
    }
}

impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn check_out(&self, address: &ServerAddress) -> Result<MockConnection> {
        match self.state.checkout {
            CheckoutBehavior::Ready => {}
            CheckoutBehavior::Hang => std::future::pending::<()>().await,
            CheckoutBehavior::Fail => {
                return Err(ErrorKind::from(io::ErrorKind::ConnectionRefused).into())
            }
        }

        self.state.checked_out.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            address: address.clone(),
            state: self.state.clone(),
        })
    }

    fn check_in(&self, _connection: MockConnection) {
        self.state.checked_in.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self, _connection: MockConnection) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}
