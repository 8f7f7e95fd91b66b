// Integration tests for the arbor messaging core: ordering, single-flight
// delivery, the ask protocol and the context surface.

use arbor::{
    ActorContext, ActorRef, ActorSystem, Behavior, Error, Handler, Message,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone)]
enum Msg {
    Append(String),
    Query,
    Text(String),
    Echo(u32),
    SpawnChildren,
    ListChildren,
    Names(Vec<String>),
    Forward(ActorRef<Msg>),
}

impl Message for Msg {}

// Stateful accumulator: every append trampolines to a handler carrying the
// grown text.
struct Accumulator {
    text: String,
}

#[async_trait]
impl Handler<Msg> for Accumulator {
    async fn handle(
        &mut self,
        message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        match message {
            Msg::Append(part) => Ok(Behavior::next(Accumulator {
                text: format!("{}{}", self.text, part),
            })),
            Msg::Query => {
                if let Some(sender) = ctx.sender().cloned() {
                    ctx.tell(&sender, Msg::Text(self.text.clone())).await?;
                }
                Ok(Behavior::Same)
            }
            _ => Ok(Behavior::Same),
        }
    }
}

// Fixed echo actor that records the order in which messages were handled,
// slowing down one of them to expose any reordering.
#[derive(Clone)]
struct SlowRecorder {
    seen: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl Handler<Msg> for SlowRecorder {
    async fn handle(
        &mut self,
        message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        if let Msg::Echo(n) = message {
            if n == 2 {
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
            self.seen.lock().unwrap().push(n);
            if let Some(sender) = ctx.sender().cloned() {
                ctx.tell(&sender, Msg::Echo(n)).await?;
            }
        }
        Ok(Behavior::Same)
    }
}

#[derive(Clone)]
struct Idle;

#[async_trait]
impl Handler<Msg> for Idle {
    async fn handle(
        &mut self,
        _message: Msg,
        _ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        Ok(Behavior::Same)
    }
}

fn start() -> arbor::SystemRef<Msg> {
    let (system, _runner) =
        ActorSystem::create::<Msg>(CancellationToken::new());
    system
}

#[tokio::test]
async fn stateful_accumulator_scenario() {
    let system = start();
    let accumulator = system
        .spawn(
            || Accumulator {
                text: String::new(),
            },
            Some("accumulator"),
        )
        .await
        .unwrap();

    accumulator
        .tell(Msg::Append("Hello ".to_owned()))
        .await
        .unwrap();
    accumulator
        .tell(Msg::Append("World. ".to_owned()))
        .await
        .unwrap();

    let reply = accumulator.ask(Msg::Query).await.unwrap();
    match reply {
        Msg::Text(text) => assert_eq!(text, "Hello World. "),
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn messages_are_processed_in_arrival_order() {
    let system = start();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let actor = system
        .spawn_fixed(SlowRecorder { seen: seen.clone() }, Some("recorder"))
        .await
        .unwrap();

    // A slow second message must not let the third overtake it.
    for n in 1..=3 {
        actor.tell(Msg::Echo(n)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);

    // Replies to asks arrive in ask order as well.
    for n in 4..=6 {
        let reply = actor.ask(Msg::Echo(n)).await.unwrap();
        match reply {
            Msg::Echo(m) => assert_eq!(m, n),
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}

#[derive(Clone)]
struct Gauge {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<Msg> for Gauge {
    async fn handle(
        &mut self,
        _message: Msg,
        _ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Behavior::Same)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_most_one_message_is_in_flight() {
    let system = start();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let actor = system
        .spawn_fixed(
            Gauge {
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            },
            Some("gauge"),
        )
        .await
        .unwrap();

    for n in 0..25 {
        actor.tell(Msg::Echo(n)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

// Replies after a configurable delay; used for the ask window tests.
#[derive(Clone)]
struct Delayed;

#[async_trait]
impl Handler<Msg> for Delayed {
    async fn handle(
        &mut self,
        _message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        tokio::time::sleep(Duration::from_millis(60)).await;
        if let Some(sender) = ctx.sender().cloned() {
            ctx.tell(&sender, Msg::Text("done".to_owned())).await?;
        }
        Ok(Behavior::Same)
    }
}

#[tokio::test]
async fn ask_rejects_when_the_reply_misses_the_window() {
    let system = start();
    let actor = system.spawn_fixed(Delayed, Some("delayed")).await.unwrap();

    let late = actor
        .ask_timeout(Msg::Query, Duration::from_millis(5))
        .await;
    assert!(matches!(late, Err(Error::AskTimeout(_))));

    let in_time = actor
        .ask_timeout(Msg::Query, Duration::from_millis(500))
        .await
        .unwrap();
    match in_time {
        Msg::Text(text) => assert_eq!(text, "done"),
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn ask_to_stopped_actor_fails_fast() {
    let system = start();
    let actor = system.spawn_fixed(Idle, Some("idle")).await.unwrap();
    actor.stop().await;

    let result = actor.ask(Msg::Query).await;
    assert!(matches!(result, Err(Error::AlreadyStopped(_))));
}

#[tokio::test]
async fn tell_to_stopped_actor_is_a_silent_noop() {
    let system = start();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let actor = system
        .spawn_fixed(SlowRecorder { seen: seen.clone() }, Some("recorder"))
        .await
        .unwrap();
    actor.stop().await;

    actor.tell(Msg::Echo(9)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen.lock().unwrap().is_empty());
}

// Answers identity queries with name, path and parent path.
#[derive(Clone)]
struct Introspector;

#[async_trait]
impl Handler<Msg> for Introspector {
    async fn handle(
        &mut self,
        message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        if let Msg::Query = message {
            let parent = match ctx.parent().await {
                Some(parent) => parent.path().to_string(),
                None => String::new(),
            };
            let identity =
                format!("{}|{}|{}", ctx.name(), ctx.path(), parent);
            if let Some(sender) = ctx.sender().cloned() {
                ctx.tell(&sender, Msg::Text(identity)).await?;
            }
        }
        Ok(Behavior::Same)
    }
}

#[tokio::test]
async fn context_exposes_name_path_and_parent() {
    let system = start();
    let root = system
        .spawn_fixed(Introspector, Some("ident"))
        .await
        .unwrap();
    let child = root
        .spawn_fixed(Introspector, Some("kid"))
        .await
        .unwrap();

    match root.ask(Msg::Query).await.unwrap() {
        Msg::Text(identity) => {
            assert_eq!(identity, "ident|/user/ident|");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    match child.ask(Msg::Query).await.unwrap() {
        Msg::Text(identity) => {
            assert_eq!(identity, "kid|/user/ident/kid|/user/ident");
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    assert!(root.parent().await.is_none());
    let childs_parent = child.parent().await.unwrap();
    assert_eq!(childs_parent.path(), root.path());
}

// Spawns children from inside its own behavior and reports their names.
#[derive(Clone)]
struct Nursery;

#[async_trait]
impl Handler<Msg> for Nursery {
    async fn handle(
        &mut self,
        message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        match message {
            Msg::SpawnChildren => {
                ctx.spawn_fixed(Idle, Some("child1")).await?;
                ctx.spawn(|| Idle, Some("child2")).await?;
            }
            Msg::ListChildren => {
                let names = ctx.children().await;
                if let Some(sender) = ctx.sender().cloned() {
                    ctx.tell(&sender, Msg::Names(names)).await?;
                }
            }
            _ => {}
        }
        Ok(Behavior::Same)
    }
}

#[tokio::test]
async fn behaviors_can_spawn_children() {
    let system = start();
    let nursery = system.spawn_fixed(Nursery, Some("nursery")).await.unwrap();

    nursery.tell(Msg::SpawnChildren).await.unwrap();
    match nursery.ask(Msg::ListChildren).await.unwrap() {
        Msg::Names(names) => {
            assert_eq!(names, vec!["child1".to_owned(), "child2".to_owned()]);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    assert_eq!(
        nursery.children().await,
        vec!["child1".to_owned(), "child2".to_owned()]
    );
}

// Forwards the reply reference of an ask to another actor, which answers in
// the relay's stead.
#[derive(Clone)]
struct Relay;

#[async_trait]
impl Handler<Msg> for Relay {
    async fn handle(
        &mut self,
        message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        if let Msg::Forward(target) = message {
            if let Some(sender) = ctx.sender().cloned() {
                ctx.tell(&target, Msg::Forward(sender)).await?;
            }
        }
        Ok(Behavior::Same)
    }
}

#[derive(Clone)]
struct Responder;

#[async_trait]
impl Handler<Msg> for Responder {
    async fn handle(
        &mut self,
        message: Msg,
        ctx: &mut ActorContext<Msg>,
    ) -> Result<Behavior<Msg>, Error> {
        if let Msg::Forward(reply_to) = message {
            ctx.tell(&reply_to, Msg::Text("hello from responder".to_owned()))
                .await?;
        }
        Ok(Behavior::Same)
    }
}

#[tokio::test]
async fn references_travel_as_message_payloads() {
    let system = start();
    let relay = system.spawn_fixed(Relay, Some("relay")).await.unwrap();
    let responder = system
        .spawn_fixed(Responder, Some("responder"))
        .await
        .unwrap();

    // The ask's ephemeral reply reference hops through two actors and still
    // resolves this ask, matched by identity.
    let reply = relay.ask(Msg::Forward(responder.clone())).await.unwrap();
    match reply {
        Msg::Text(text) => assert_eq!(text, "hello from responder"),
        other => panic!("unexpected reply: {:?}", other),
    }
}
