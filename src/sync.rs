//! Client side of the chat.
//!
//! A [`ChatHandle`] owns one actor task that keeps a [`RoomView`] in step with
//! a [`ChatStore`]: it polls the current room every [`POLL_INTERVAL`], shows
//! sends immediately, and switches to local-only chat once the store stops
//! answering. Store calls run as their own tasks and report back tagged with
//! the room generation they were issued for, so answers for a room the user
//! already left are dropped.

use std::{collections::HashMap, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    db::{DEFAULT_ROOM, Message, NewMessage, NewTyping, TypingIndicator, room_or_default, to_millis},
    error::{ChatError, ChatResult},
    identity::Identity,
    limiter::RateLimiter,
    store::ChatStore,
    text::prepare_outgoing,
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const TYPING_IDLE: Duration = Duration::from_secs(3);
pub const HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Connected,
    /// Local-only chat, nothing is synced any more.
    Disconnected,
}

/// What a front-end renders.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomView {
    pub room: String,
    pub mode: Mode,
    pub messages: Vec<Message>,
    /// Other users typing in `room`.
    pub typing: Vec<TypingIndicator>,
}

/// Toast-style feedback for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RateLimited,
    Rejected(String),
    Offline,
}

enum Command {
    Send(String),
    Input,
    SwitchRoom(String),
}

enum Event {
    Messages {
        generation: u64,
        result: ChatResult<Vec<Message>>,
    },
    Typing {
        generation: u64,
        result: ChatResult<Vec<TypingIndicator>>,
    },
    Appended {
        pending: Message,
        result: ChatResult<Message>,
    },
}

pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<RoomView>,
    notices: mpsc::UnboundedReceiver<Notice>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    pub fn spawn<S: ChatStore + 'static>(remote: S, identity: Identity, room: impl Into<String>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (sync, view, notices, events) = SyncLoop::new(Arc::new(remote), identity, room.into());

        Self {
            commands,
            view,
            notices,
            task: tokio::spawn(sync.run(command_rx, events)),
        }
    }

    pub fn send(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::Send(text.into()));
    }

    /// Call on every change of the input box.
    pub fn input(&self) {
        let _ = self.commands.send(Command::Input);
    }

    pub fn switch_room(&self, room: impl Into<String>) {
        let _ = self.commands.send(Command::SwitchRoom(room.into()));
    }

    pub fn view(&self) -> watch::Receiver<RoomView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> RoomView {
        self.view.borrow().clone()
    }

    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        let _ = task.await;
    }
}

/// A send that was shown before the store answered for it.
struct Pending {
    shown: Message,
    stored: Option<Message>,
}

struct SyncLoop<S> {
    remote: Arc<S>,
    identity: Identity,
    room: String,
    mode: Mode,
    generation: u64,
    local: HashMap<String, Vec<Message>>,
    pending: Vec<Pending>,
    limiter: RateLimiter,
    typing_deadline: Option<Instant>,
    view: watch::Sender<RoomView>,
    notices: mpsc::UnboundedSender<Notice>,
    events: mpsc::UnboundedSender<Event>,
}

impl<S: ChatStore + 'static> SyncLoop<S> {
    #[allow(clippy::type_complexity)]
    fn new(
        remote: Arc<S>,
        identity: Identity,
        room: String,
    ) -> (
        Self,
        watch::Receiver<RoomView>,
        mpsc::UnboundedReceiver<Notice>,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let room = room_or_default(room);
        let (view, view_rx) = watch::channel(RoomView {
            room: room.clone(),
            mode: Mode::Connected,
            messages: Vec::new(),
            typing: Vec::new(),
        });
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let sync = Self {
            remote,
            identity,
            room,
            mode: Mode::Connected,
            generation: 0,
            local: HashMap::new(),
            pending: Vec::new(),
            limiter: RateLimiter::default(),
            typing_deadline: None,
            view,
            notices,
            events,
        };
        (sync, view_rx, notice_rx, event_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.probe().await;
        self.refresh();

        let mut poll = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let typing_deadline = self.typing_deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Send(text)) => self.send(text),
                    Some(Command::Input) => self.input(),
                    Some(Command::SwitchRoom(room)) => {
                        if self.switch_room(room) {
                            poll.reset();
                        }
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.apply(event),
                _ = poll.tick() => self.refresh(),
                _ = sleep_until(typing_deadline.unwrap_or_else(Instant::now)), if typing_deadline.is_some() => {
                    self.typing_deadline = None;
                    self.clear_typing(self.room.clone());
                }
            }
        }

        debug!("Sync loop for {} stopped", self.identity.username);
    }

    async fn probe(&mut self) {
        match self.remote.list(DEFAULT_ROOM, 1).await {
            Ok(_) => info!("Backend available"),
            Err(e) => {
                warn!("Backend check failed, using in-memory storage: {e}");
                self.go_offline();
            }
        }
    }

    fn refresh(&self) {
        if self.mode == Mode::Disconnected {
            return;
        }

        let (remote, room, generation, events) =
            (self.remote.clone(), self.room.clone(), self.generation, self.events.clone());
        tokio::spawn(async move {
            let result = remote.list(&room, HISTORY_LIMIT).await;
            let _ = events.send(Event::Messages { generation, result });
        });

        let (remote, room, events) = (self.remote.clone(), self.room.clone(), self.events.clone());
        tokio::spawn(async move {
            let result = remote.list_active(&room, OffsetDateTime::now_utc()).await;
            let _ = events.send(Event::Typing { generation, result });
        });
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Messages { generation, result } => {
                if !self.is_current(generation) {
                    debug!("Dropping stale message poll {generation}");
                    return;
                }
                match result {
                    Ok(messages) => {
                        let messages = self.with_pending(messages);
                        self.view.send_if_modified(|view| replace(&mut view.messages, messages));
                    }
                    Err(e) => warn!("Polling messages for {} failed: {e}", self.room),
                }
            }
            Event::Typing { generation, result } => {
                if !self.is_current(generation) {
                    return;
                }
                match result {
                    Ok(mut typing) => {
                        typing.retain(|indicator| indicator.username != self.identity.username);
                        self.view.send_if_modified(|view| replace(&mut view.typing, typing));
                    }
                    Err(e) => debug!("Polling typing for {} failed: {e}", self.room),
                }
            }
            Event::Appended { pending, result } => {
                let Some(index) = self.pending.iter().position(|p| p.shown.id == pending.id) else {
                    return;
                };

                match result {
                    Ok(stored) => {
                        debug!("Message {} stored as {}", pending.id, stored.id);
                        self.view.send_if_modified(|view| {
                            // a poll may have delivered the stored row first
                            if view.messages.iter().any(|m| m.id == stored.id) {
                                let before = view.messages.len();
                                view.messages.retain(|m| m.id != pending.id);
                                return view.messages.len() != before;
                            }
                            match view.messages.iter_mut().find(|m| m.id == pending.id) {
                                Some(shown) => {
                                    *shown = stored.clone();
                                    true
                                }
                                None => false,
                            }
                        });
                        self.typing_deadline = None;
                        self.clear_typing(stored.room.clone());
                        self.pending[index].stored = Some(stored);
                    }
                    Err(ChatError::BackendUnavailable(e)) => {
                        warn!("Failed to send message, switching to in-memory storage: {e}");
                        self.pending.remove(index);
                        self.local.entry(pending.room.clone()).or_default().push(pending);
                        self.go_offline();
                    }
                    Err(rejected) => {
                        self.pending.remove(index);
                        self.view.send_modify(|view| view.messages.retain(|m| m.id != pending.id));
                        self.notify(match rejected {
                            ChatError::Validation(reason) => Notice::Rejected(reason),
                            _ => Notice::RateLimited,
                        });
                    }
                }
            }
        }
    }

    fn send(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        if !self.limiter.try_acquire(Instant::now()) {
            self.notify(Notice::RateLimited);
            return;
        }

        let draft = match NewMessage::new(
            &self.room,
            &self.identity.username,
            &self.identity.user_color,
            prepare_outgoing(&text),
        ) {
            Ok(draft) => draft,
            Err(e) => {
                self.notify(Notice::Rejected(e.to_string()));
                return;
            }
        };

        let now = OffsetDateTime::now_utc();
        let pending = draft
            .clone()
            .into_message(format!("{}-{}", to_millis(now), rand::random::<u32>()), now);
        self.view.send_modify(|view| view.messages.push(pending.clone()));

        match self.mode {
            Mode::Disconnected => self.local.entry(self.room.clone()).or_default().push(pending),
            Mode::Connected => {
                self.pending.push(Pending {
                    shown: pending.clone(),
                    stored: None,
                });
                let (remote, events) = (self.remote.clone(), self.events.clone());
                tokio::spawn(async move {
                    let result = remote.append(draft).await;
                    let _ = events.send(Event::Appended { pending, result });
                });
            }
        }
    }

    fn input(&mut self) {
        if self.mode == Mode::Disconnected {
            return;
        }
        let Ok(typing) = NewTyping::new(&self.room, &self.identity.username, &self.identity.user_color) else {
            return;
        };

        let remote = self.remote.clone();
        tokio::spawn(async move {
            if let Err(e) = remote.touch(typing).await {
                debug!("Typing update failed: {e}");
            }
        });
        self.typing_deadline = Some(Instant::now() + TYPING_IDLE);
    }

    fn clear_typing(&self, room: String) {
        if self.mode == Mode::Disconnected {
            return;
        }

        let (remote, username) = (self.remote.clone(), self.identity.username.clone());
        tokio::spawn(async move {
            if let Err(e) = remote.clear(&room, &username).await {
                debug!("Clearing typing failed: {e}");
            }
        });
    }

    /// Returns whether the room actually changed.
    fn switch_room(&mut self, room: String) -> bool {
        let room = room_or_default(room);
        if room == self.room {
            return false;
        }

        if self.typing_deadline.take().is_some() {
            self.clear_typing(self.room.clone());
        }
        self.generation += 1;
        self.room = room.clone();

        let messages = match self.mode {
            Mode::Connected => Vec::new(),
            Mode::Disconnected => self.local.get(&room).cloned().unwrap_or_default(),
        };
        self.view.send_modify(|view| {
            view.room = room;
            view.messages = messages;
            view.typing.clear();
        });

        self.refresh();
        true
    }

    fn go_offline(&mut self) {
        if self.mode == Mode::Disconnected {
            return;
        }

        self.mode = Mode::Disconnected;
        self.generation += 1;
        self.typing_deadline = None;
        for pending in self.pending.drain(..) {
            if pending.stored.is_none() {
                self.local.entry(pending.shown.room.clone()).or_default().push(pending.shown);
            }
        }

        let messages = self.local.get(&self.room).cloned().unwrap_or_default();
        self.view.send_modify(|view| {
            view.mode = Mode::Disconnected;
            view.messages = messages;
            view.typing.clear();
        });
        self.notify(Notice::Offline);
    }

    /// Keeps own sends visible until a poll has caught up with them.
    fn with_pending(&mut self, mut messages: Vec<Message>) -> Vec<Message> {
        let newest = messages.last().map(|m| m.created_at);
        self.pending.retain(|p| match &p.stored {
            Some(stored) if stored.room == self.room => {
                !messages.iter().any(|m| m.id == stored.id)
                    && newest.is_none_or(|newest| newest <= stored.created_at)
            }
            Some(_) => false,
            None => true,
        });

        // each polled row stands in for at most one unconfirmed send
        let mut claimed = vec![false; messages.len()];
        let mut extra = Vec::new();
        for p in self.pending.iter().filter(|p| p.shown.room == self.room) {
            if let Some(stored) = &p.stored {
                extra.push(stored.clone());
                continue;
            }

            let shown = &p.shown;
            let echo = messages.iter().enumerate().position(|(i, m)| {
                !claimed[i]
                    && m.username == shown.username
                    && m.text == shown.text
                    && m.created_at >= shown.created_at
            });
            match echo {
                Some(i) => claimed[i] = true,
                None => extra.push(shown.clone()),
            }
        }

        messages.extend(extra);
        messages
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.mode == Mode::Connected
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}

fn replace<T: PartialEq>(slot: &mut Vec<T>, new: Vec<T>) -> bool {
    if *slot == new {
        return false;
    }
    *slot = new;
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::{limiter::SEND_WINDOW, store::MemoryStore};

    /// A store that can be unplugged.
    struct Flaky {
        inner: Arc<MemoryStore>,
        down: AtomicBool,
    }

    impl Flaky {
        fn new(inner: Arc<MemoryStore>, down: bool) -> Arc<Self> {
            Arc::new(Self {
                inner,
                down: AtomicBool::new(down),
            })
        }

        fn check(&self) -> ChatResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ChatError::unavailable("connection refused"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ChatStore for Flaky {
        async fn append(&self, message: NewMessage) -> ChatResult<Message> {
            self.check()?;
            self.inner.append(message).await
        }

        async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>> {
            self.check()?;
            self.inner.list(room, limit).await
        }

        async fn touch(&self, typing: NewTyping) -> ChatResult<()> {
            self.check()?;
            self.inner.touch(typing).await
        }

        async fn clear(&self, room: &str, username: &str) -> ChatResult<()> {
            self.check()?;
            self.inner.clear(room, username).await
        }

        async fn list_active(&self, room: &str, now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>> {
            self.check()?;
            self.inner.list_active(room, now).await
        }
    }

    fn ape() -> Identity {
        Identity::new("Ape42", "#836ef9")
    }

    fn settle() -> impl std::future::Future<Output = ()> {
        sleep(Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn send_shows_immediately_and_reaches_store() {
        let store = Arc::new(MemoryStore::default());
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        chat.send("gm :rocket:");
        let shown = chat
            .view()
            .wait_for(|view| !view.messages.is_empty())
            .await
            .unwrap()
            .clone();
        assert_eq!(shown.messages[0].text, "gm 🚀");
        assert_eq!(shown.mode, Mode::Connected);

        sleep(POLL_INTERVAL + Duration::from_millis(100)).await;
        let stored = store.list("lobby", 50).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "gm 🚀");
        assert_eq!(chat.snapshot().messages, stored);

        chat.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_send_within_window_never_reaches_store() {
        let store = Arc::new(MemoryStore::default());
        let mut chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        for text in ["one", "two", "three", "four"] {
            chat.send(text);
        }
        assert_eq!(chat.next_notice().await, Some(Notice::RateLimited));

        settle().await;
        let texts: Vec<_> = store
            .list("lobby", 50)
            .await
            .unwrap()
            .into_iter()
            .map(|message| message.text)
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);

        sleep(SEND_WINDOW).await;
        chat.send("five");
        settle().await;
        assert_eq!(store.list("lobby", 50).await.unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backend_at_start_keeps_chat_local() {
        let shared = Arc::new(MemoryStore::default());
        let mut offline = ChatHandle::spawn(Flaky::new(shared.clone(), true), ape(), "lobby");
        let other_tab = ChatHandle::spawn(shared.clone(), Identity::new("Pepe7", "#00ff00"), "lobby");

        assert_eq!(offline.next_notice().await, Some(Notice::Offline));
        offline.send("gm");

        let view = offline
            .view()
            .wait_for(|view| view.messages.len() == 1)
            .await
            .unwrap()
            .clone();
        assert_eq!(view.mode, Mode::Disconnected);
        assert_eq!(view.messages[0].text, "gm");
        assert_eq!(view.messages[0].username, "Ape42");

        sleep(POLL_INTERVAL * 2).await;
        assert!(shared.list("lobby", 50).await.unwrap().is_empty());
        assert!(other_tab.snapshot().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_switches_to_local_for_good() {
        let shared = Arc::new(MemoryStore::default());
        let flaky = Flaky::new(shared.clone(), false);
        let mut chat = ChatHandle::spawn(flaky.clone(), ape(), "lobby");
        settle().await;

        flaky.down.store(true, Ordering::SeqCst);
        chat.send("gm");
        assert_eq!(chat.next_notice().await, Some(Notice::Offline));

        let view = chat.snapshot();
        assert_eq!(view.mode, Mode::Disconnected);
        assert_eq!(view.messages.len(), 1);

        flaky.down.store(false, Ordering::SeqCst);
        sleep(SEND_WINDOW).await;
        chat.send("still here?");
        sleep(POLL_INTERVAL * 2).await;

        assert!(shared.list("lobby", 50).await.unwrap().is_empty());
        let texts: Vec<_> = chat.snapshot().messages.into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["gm", "still here?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_is_touched_then_cleared_after_idle() {
        let store = Arc::new(MemoryStore::default());
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        chat.input();
        settle().await;
        let active = store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username, "Ape42");

        // keystrokes keep pushing the clear out
        sleep(Duration::from_secs(2)).await;
        chat.input();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap().len(), 1);

        sleep(TYPING_IDLE).await;
        assert!(store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn view_shows_other_typists_only() {
        let store = Arc::new(MemoryStore::default());
        store.touch(NewTyping::new("lobby", "Pepe7", "#00ff00").unwrap()).await.unwrap();
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        chat.input();
        sleep(POLL_INTERVAL + Duration::from_millis(100)).await;

        let typing: Vec<_> = chat.snapshot().typing.into_iter().map(|t| t.username).collect();
        assert_eq!(typing, ["Pepe7"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_polls_do_not_republish() {
        let store = Arc::new(MemoryStore::default());
        store
            .append(NewMessage::new("lobby", "Pepe7", "#00ff00", "gm").unwrap())
            .await
            .unwrap();
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        let mut view = chat.view();
        view.wait_for(|view| view.messages.len() == 1).await.unwrap();
        view.borrow_and_update();

        sleep(POLL_INTERVAL * 3).await;
        assert!(!view.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_room_loads_that_room() {
        let store = Arc::new(MemoryStore::default());
        store
            .append(NewMessage::new("dev", "Pepe7", "#00ff00", "ship it").unwrap())
            .await
            .unwrap();
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");
        settle().await;
        assert!(chat.snapshot().messages.is_empty());

        chat.switch_room("dev");
        let view = chat
            .view()
            .wait_for(|view| view.room == "dev" && view.messages.len() == 1)
            .await
            .unwrap()
            .clone();
        assert_eq!(view.messages[0].text, "ship it");
    }

    #[tokio::test]
    async fn results_for_a_left_room_are_dropped() {
        let store = Arc::new(MemoryStore::default());
        let (mut sync, view, _notices, _events) = SyncLoop::new(store, ape(), "lobby".to_owned());
        let stale_generation = sync.generation;

        let lobby_message = NewMessage::new("lobby", "Pepe7", "#00ff00", "gm")
            .unwrap()
            .into_message("1".to_owned(), OffsetDateTime::now_utc());

        assert!(sync.switch_room("dev".to_owned()));
        sync.apply(Event::Messages {
            generation: stale_generation,
            result: Ok(vec![lobby_message.clone()]),
        });
        assert_eq!(view.borrow().room, "dev");
        assert!(view.borrow().messages.is_empty());

        sync.apply(Event::Messages {
            generation: sync.generation,
            result: Ok(vec![lobby_message]),
        });
        assert_eq!(view.borrow().messages.len(), 1);
    }

    #[tokio::test]
    async fn typing_for_a_left_room_is_dropped() {
        let store = Arc::new(MemoryStore::default());
        let (mut sync, view, _notices, _events) = SyncLoop::new(store, ape(), "lobby".to_owned());
        let stale_generation = sync.generation;

        let pepe = NewTyping::new("lobby", "Pepe7", "#00ff00")
            .unwrap()
            .at(OffsetDateTime::now_utc());

        assert!(sync.switch_room("dev".to_owned()));
        sync.apply(Event::Typing {
            generation: stale_generation,
            result: Ok(vec![pepe.clone()]),
        });
        assert!(view.borrow().typing.is_empty());

        sync.apply(Event::Typing {
            generation: sync.generation,
            result: Ok(vec![pepe]),
        });
        assert_eq!(view.borrow().typing.len(), 1);
    }

    fn ids(view: &watch::Receiver<RoomView>) -> Vec<String> {
        view.borrow().messages.iter().map(|m| m.id.clone()).collect()
    }

    #[tokio::test]
    async fn poll_answering_before_the_send_shows_it_once() {
        let store = Arc::new(MemoryStore::default());
        let (mut sync, view, _notices, _events) = SyncLoop::new(store.clone(), ape(), "lobby".to_owned());

        sync.send("gm".to_owned());
        let shown = view.borrow().messages[0].clone();
        let stored = store
            .append(NewMessage::new("lobby", "Ape42", "#836ef9", "gm").unwrap())
            .await
            .unwrap();

        sync.apply(Event::Messages {
            generation: sync.generation,
            result: Ok(vec![stored.clone()]),
        });
        assert_eq!(ids(&view), [stored.id.clone()]);

        sync.apply(Event::Appended {
            pending: shown,
            result: Ok(stored.clone()),
        });
        assert_eq!(ids(&view), [stored.id.clone()]);

        sync.apply(Event::Messages {
            generation: sync.generation,
            result: Ok(vec![stored.clone()]),
        });
        assert_eq!(ids(&view), [stored.id]);
        assert!(sync.pending.is_empty());
    }

    #[tokio::test]
    async fn repeated_text_is_not_swallowed_by_one_echo() {
        let store = Arc::new(MemoryStore::default());
        let (mut sync, view, _notices, _events) = SyncLoop::new(store.clone(), ape(), "lobby".to_owned());

        sync.send("gm".to_owned());
        sync.send("gm".to_owned());
        let stored = store
            .append(NewMessage::new("lobby", "Ape42", "#836ef9", "gm").unwrap())
            .await
            .unwrap();

        sync.apply(Event::Messages {
            generation: sync.generation,
            result: Ok(vec![stored]),
        });
        assert_eq!(view.borrow().messages.len(), 2);
    }

    #[tokio::test]
    async fn confirmed_sends_are_forgotten_after_leaving_the_room() {
        let store = Arc::new(MemoryStore::default());
        let (mut sync, _view, _notices, _events) = SyncLoop::new(store.clone(), ape(), "lobby".to_owned());

        sync.send("gm".to_owned());
        let shown = sync.pending[0].shown.clone();
        let stored = store
            .append(NewMessage::new("lobby", "Ape42", "#836ef9", "gm").unwrap())
            .await
            .unwrap();
        sync.apply(Event::Appended {
            pending: shown,
            result: Ok(stored),
        });
        assert_eq!(sync.pending.len(), 1);

        sync.switch_room("dev".to_owned());
        sync.apply(Event::Messages {
            generation: sync.generation,
            result: Ok(Vec::new()),
        });
        assert!(sync.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stored_send_clears_typing_right_away() {
        let store = Arc::new(MemoryStore::default());
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        chat.input();
        settle().await;
        assert_eq!(store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap().len(), 1);

        chat.send("gm");
        settle().await;
        assert!(store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap().is_empty());
        assert_eq!(store.list("lobby", 50).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_room_clears_typing_in_the_old_room() {
        let store = Arc::new(MemoryStore::default());
        let chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        chat.input();
        settle().await;
        assert_eq!(store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap().len(), 1);

        chat.switch_room("dev");
        settle().await;
        assert!(store.list_active("lobby", OffsetDateTime::now_utc()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overlong_and_blank_sends_are_not_sent() {
        let store = Arc::new(MemoryStore::default());
        let mut chat = ChatHandle::spawn(store.clone(), ape(), "lobby");

        chat.send("   ");
        chat.send("a".repeat(1001));
        assert_eq!(chat.next_notice().await, Some(Notice::Rejected("Message too long".to_owned())));

        settle().await;
        assert!(store.list("lobby", 50).await.unwrap().is_empty());
        assert!(chat.snapshot().messages.is_empty());
    }
}
