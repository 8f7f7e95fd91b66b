// Supervision tests: directive semantics, the restart budget, escalation
// and one-for-all scoping.

use arbor::{
    ActorContext, ActorSystem, Behavior, Directive, Error, Handler, Message,
    SupervisionStrategy, SystemRef,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use std::time::Duration;

#[derive(Debug, Clone)]
enum Cmd {
    Boom,
    Increment,
    Count,
    Value(u64),
}

impl Message for Cmd {}

// Counter that advances by trampolining and fails on demand.
struct FragileCounter {
    count: u64,
}

#[async_trait]
impl Handler<Cmd> for FragileCounter {
    async fn handle(
        &mut self,
        message: Cmd,
        ctx: &mut ActorContext<Cmd>,
    ) -> Result<Behavior<Cmd>, Error> {
        match message {
            Cmd::Boom => Err(Error::Failure("boom".to_owned())),
            Cmd::Increment => Ok(Behavior::next(FragileCounter {
                count: self.count + 1,
            })),
            Cmd::Count => {
                if let Some(sender) = ctx.sender().cloned() {
                    ctx.tell(&sender, Cmd::Value(self.count)).await?;
                }
                Ok(Behavior::Same)
            }
            Cmd::Value(_) => Ok(Behavior::Same),
        }
    }
}

#[derive(Clone)]
struct Idle;

#[async_trait]
impl Handler<Cmd> for Idle {
    async fn handle(
        &mut self,
        _message: Cmd,
        _ctx: &mut ActorContext<Cmd>,
    ) -> Result<Behavior<Cmd>, Error> {
        Ok(Behavior::Same)
    }
}

fn start() -> SystemRef<Cmd> {
    let (system, _runner) =
        ActorSystem::create::<Cmd>(CancellationToken::new());
    system
}

async fn count_of(actor: &arbor::ActorRef<Cmd>) -> u64 {
    match actor.ask(Cmd::Count).await.unwrap() {
        Cmd::Value(count) => count,
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn default_supervision_stops_the_failing_actor() {
    let system = start();
    let actor = system
        .spawn(|| FragileCounter { count: 0 }, Some("counter"))
        .await
        .unwrap();

    actor.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(actor.is_stopped());
    assert!(system.children().await.is_empty());
}

#[tokio::test]
async fn failures_never_surface_to_the_asker() {
    let system = start();
    let actor = system
        .spawn(|| FragileCounter { count: 0 }, Some("counter"))
        .await
        .unwrap();

    // The failure is contained by supervision; the asker only observes a
    // missed reply window.
    let result = actor
        .ask_timeout(Cmd::Boom, Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(Error::AskTimeout(_))));
}

#[tokio::test]
async fn continue_directive_discards_the_message_and_keeps_state() {
    let system = start();
    let strategy = SupervisionStrategy::one_for_one(|_| Directive::Continue);
    let actor = system
        .spawn_with(|| FragileCounter { count: 0 }, Some("counter"), strategy)
        .await
        .unwrap();

    actor.tell(Cmd::Increment).await.unwrap();
    actor.tell(Cmd::Increment).await.unwrap();
    actor.tell(Cmd::Boom).await.unwrap();
    actor.tell(Cmd::Increment).await.unwrap();

    assert_eq!(count_of(&actor).await, 3);
    assert!(!actor.is_stopped());
}

#[tokio::test]
async fn restart_directive_reinitializes_from_the_factory() {
    let system = start();
    let strategy = SupervisionStrategy::one_for_one(|_| Directive::Restart);
    let actor = system
        .spawn_with(|| FragileCounter { count: 0 }, Some("counter"), strategy)
        .await
        .unwrap();

    actor.tell(Cmd::Increment).await.unwrap();
    actor.tell(Cmd::Increment).await.unwrap();
    assert_eq!(count_of(&actor).await, 2);

    actor.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Fresh state, same node: mailbox and registration survived.
    assert!(!actor.is_stopped());
    assert_eq!(count_of(&actor).await, 0);
}

#[tokio::test]
async fn exhausting_the_restart_budget_stops_the_actor() {
    let system = start();
    let strategy = SupervisionStrategy::one_for_one(|_| Directive::Restart)
        .with_retry_window(2, Duration::from_secs(5));
    let actor = system
        .spawn_with(|| FragileCounter { count: 0 }, Some("counter"), strategy)
        .await
        .unwrap();

    for _ in 0..3 {
        actor.tell(Cmd::Boom).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(actor.is_stopped());
}

#[tokio::test]
async fn deciders_observe_the_retry_count() {
    let system = start();
    // Restart once, then give up.
    let strategy = SupervisionStrategy::one_for_one(|failure| {
        if failure.retries < 1 {
            Directive::Restart
        } else {
            Directive::Stop
        }
    });
    let actor = system
        .spawn_with(|| FragileCounter { count: 0 }, Some("counter"), strategy)
        .await
        .unwrap();

    actor.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!actor.is_stopped());

    actor.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(actor.is_stopped());
}

#[tokio::test]
async fn escalation_defers_to_the_parent_strategy() {
    let system = start();
    let supervisor = system
        .spawn_fixed_with(
            Idle,
            Some("supervisor"),
            SupervisionStrategy::one_for_one(|_| Directive::Stop),
        )
        .await
        .unwrap();
    let worker = supervisor
        .spawn_with(
            || FragileCounter { count: 0 },
            Some("worker"),
            SupervisionStrategy::one_for_one(|_| Directive::Escalate),
        )
        .await
        .unwrap();

    worker.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The parent's verdict stopped the failing child, not the parent.
    assert!(worker.is_stopped());
    assert!(!supervisor.is_stopped());
    assert!(supervisor.children().await.is_empty());
}

#[tokio::test]
async fn unresolved_escalation_stops_the_offending_subtree() {
    let system = start();
    let supervisor = system
        .spawn_fixed_with(
            Idle,
            Some("supervisor"),
            SupervisionStrategy::one_for_one(|_| Directive::Escalate),
        )
        .await
        .unwrap();
    let worker = supervisor
        .spawn_with(
            || FragileCounter { count: 0 },
            Some("worker"),
            SupervisionStrategy::one_for_one(|_| Directive::Escalate),
        )
        .await
        .unwrap();

    worker.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Nobody resolved the failure: the whole subtree goes down, the
    // process does not.
    assert!(worker.is_stopped());
    assert!(supervisor.is_stopped());
    assert!(system.children().await.is_empty());
}

#[tokio::test]
async fn one_for_all_stop_takes_the_siblings_down() {
    let system = start();
    let parent = system.spawn_fixed(Idle, Some("parent")).await.unwrap();
    let fragile = parent
        .spawn_with(
            || FragileCounter { count: 0 },
            Some("fragile"),
            SupervisionStrategy::one_for_all(|_| Directive::Stop),
        )
        .await
        .unwrap();
    let sibling1 = parent.spawn_fixed(Idle, Some("sibling1")).await.unwrap();
    let sibling2 = parent.spawn_fixed(Idle, Some("sibling2")).await.unwrap();

    fragile.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(fragile.is_stopped());
    assert!(sibling1.is_stopped());
    assert!(sibling2.is_stopped());
    assert!(!parent.is_stopped());
    assert!(parent.children().await.is_empty());
}

#[tokio::test]
async fn one_for_all_restart_resets_the_siblings() {
    let system = start();
    let parent = system.spawn_fixed(Idle, Some("parent")).await.unwrap();
    let fragile = parent
        .spawn_with(
            || FragileCounter { count: 0 },
            Some("fragile"),
            SupervisionStrategy::one_for_all(|_| Directive::Restart),
        )
        .await
        .unwrap();
    let sibling = parent
        .spawn_with(
            || FragileCounter { count: 0 },
            Some("sibling"),
            SupervisionStrategy::default(),
        )
        .await
        .unwrap();

    sibling.tell(Cmd::Increment).await.unwrap();
    sibling.tell(Cmd::Increment).await.unwrap();
    assert_eq!(count_of(&sibling).await, 2);

    fragile.tell(Cmd::Boom).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Both were reinitialized from their factories and stay alive.
    assert!(!fragile.is_stopped());
    assert!(!sibling.is_stopped());
    assert_eq!(count_of(&sibling).await, 0);
    assert_eq!(count_of(&fragile).await, 0);
}
