use std::{collections::HashSet, time::Duration};

use tokio::time::timeout;
use uuid::Uuid;

use trivia_session_back::{
    config::AppConfig,
    dao::session_store::{StoreHandles, memory::MemoryStore},
    dto::{
        game::{ChapterInput, CreateGameRequest, CreateTeamRequest, QuestionView},
        question::{CreateAnswerRequest, CreateQuestionRequest, QuestionSummary},
        sse::ServerEvent,
    },
    error::ServiceError,
    services::{engine::GameEngine, game_service, live_updates, question_service},
    state::{AppState, SharedState, Subscription, Topic, lifecycle::GameStatus},
};

async fn running_state() -> SharedState {
    let state = AppState::new(AppConfig::default());
    state
        .install_stores(StoreHandles::from_store(MemoryStore::new()))
        .await;
    let receiver = state
        .take_live_receiver()
        .await
        .expect("live receiver available");
    live_updates::spawn(state.clone(), receiver);
    state
}

async fn author(engine: &GameEngine, book: &str, chapter: &str, text: &str) -> QuestionSummary {
    question_service::create_question(
        engine,
        CreateQuestionRequest {
            book: book.into(),
            chapter: chapter.into(),
            verses: "1-10".into(),
            text: text.into(),
            answers: vec![
                CreateAnswerRequest {
                    text: format!("{text} (right)"),
                    correct: true,
                },
                CreateAnswerRequest {
                    text: format!("{text} (wrong)"),
                    correct: false,
                },
            ],
        },
    )
    .await
    .expect("question created")
}

async fn create_game(engine: &GameEngine, chapters: &[(&str, &str)]) -> (Uuid, Uuid) {
    let details = game_service::create_game(
        engine,
        CreateGameRequest {
            name: "Evening quiz".into(),
            seconds: 30,
            question_count: 0,
            chapters: chapters
                .iter()
                .map(|(book, chapter)| ChapterInput {
                    book: (*book).into(),
                    chapter: (*chapter).into(),
                })
                .collect(),
        },
    )
    .await
    .expect("game created");
    (details.game.id, details.teams[0].id)
}

fn active(view: QuestionView) -> (u32, u32, QuestionSummary) {
    match view {
        QuestionView::Active {
            position,
            total,
            question,
            ..
        } => (position, total, question),
        other => panic!("expected an active question, got {other:?}"),
    }
}

fn answer_id(question: &QuestionSummary, correct: bool) -> Uuid {
    question
        .answers
        .iter()
        .find(|answer| answer.correct == correct)
        .map(|answer| answer.id)
        .expect("answer with requested flag")
}

async fn next_event(subscription: &mut Subscription) -> ServerEvent {
    timeout(Duration::from_secs(1), subscription.receiver.recv())
        .await
        .expect("event within a second")
        .expect("subscription open")
}

#[tokio::test]
async fn two_question_game_finishes_after_second_next() {
    let state = running_state().await;
    let engine = state.require_engine().await.unwrap();
    author(&engine, "Genesis", "1", "Who created the heavens?").await;
    author(&engine, "Genesis", "1", "What was made on the first day?").await;
    let (game_id, home_id) = create_game(&engine, &[("Genesis", "1")]).await;
    let visitors = game_service::add_team(
        &engine,
        game_id,
        CreateTeamRequest {
            name: "Visitors".into(),
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        engine.current_question(game_id).await.unwrap(),
        QuestionView::Waiting { .. }
    ));

    let started = engine.start_game(game_id).await.unwrap();
    assert_eq!(started.status, GameStatus::Started);
    let (position, total, first) = active(engine.current_question(game_id).await.unwrap());
    assert_eq!((position, total), (0, 2));

    engine
        .submit_team_answer(game_id, home_id, answer_id(&first, true))
        .await
        .unwrap();
    engine
        .submit_team_answer(game_id, visitors.id, answer_id(&first, false))
        .await
        .unwrap();

    engine.next_question(game_id).await.unwrap();
    let (position, _, second) = active(engine.current_question(game_id).await.unwrap());
    assert_eq!(position, 1);
    assert_ne!(first.id, second.id);

    engine
        .submit_team_answer(game_id, home_id, answer_id(&second, true))
        .await
        .unwrap();
    engine
        .submit_team_answer(game_id, visitors.id, answer_id(&second, true))
        .await
        .unwrap();

    let finished = engine.next_question(game_id).await.unwrap();
    assert_eq!(finished.status, GameStatus::Finished);
    assert!(matches!(
        engine.current_question(game_id).await.unwrap(),
        QuestionView::Finished
    ));

    let report = engine.finished_game_report(game_id).await.unwrap();
    let scores = report
        .teams
        .iter()
        .map(|team| (team.name.as_str(), team.score))
        .collect::<Vec<_>>();
    assert_eq!(scores, vec![("Home", 2), ("Visitors", 1)]);
    assert_eq!(report.teams[0].answers.len(), 2);
}

#[tokio::test]
async fn play_order_covers_exactly_the_selected_chapters() {
    let state = running_state().await;
    let engine = state.require_engine().await.unwrap();
    let mut expected = HashSet::new();
    for index in 0..4 {
        expected.insert(author(&engine, "Mark", "4", &format!("Parable {index}")).await.id);
    }
    expected.insert(author(&engine, "Mark", "5", "Legion").await.id);
    author(&engine, "Mark", "6", "Loaves").await;

    let (game_id, _) = create_game(&engine, &[("Mark", "4"), ("Mark", "5")]).await;
    engine.start_game(game_id).await.unwrap();

    let mut seen = HashSet::new();
    let mut positions = Vec::new();
    loop {
        match engine.current_question(game_id).await.unwrap() {
            QuestionView::Active {
                position,
                total,
                question,
                ..
            } => {
                assert_eq!(total as usize, expected.len());
                assert!(seen.insert(question.id), "question repeated in play order");
                positions.push(position);
            }
            QuestionView::Finished => break,
            QuestionView::Waiting { .. } => panic!("started game lost its pointer"),
        }
        engine.next_question(game_id).await.unwrap();
    }

    assert_eq!(seen, expected);
    assert_eq!(positions, (0..expected.len() as u32).collect::<Vec<_>>());
}

#[tokio::test]
async fn previous_stops_at_the_first_question() {
    let state = running_state().await;
    let engine = state.require_engine().await.unwrap();
    author(&engine, "Jonah", "1", "Where did Jonah flee?").await;
    author(&engine, "Jonah", "1", "What swallowed Jonah?").await;
    let (game_id, _) = create_game(&engine, &[("Jonah", "1")]).await;
    engine.start_game(game_id).await.unwrap();

    engine.next_question(game_id).await.unwrap();
    engine.previous_question(game_id).await.unwrap();
    let (position, _, _) = active(engine.current_question(game_id).await.unwrap());
    assert_eq!(position, 0);

    let unchanged = engine.previous_question(game_id).await.unwrap();
    assert_eq!(unchanged.status, GameStatus::Started);
    let (position, _, _) = active(engine.current_question(game_id).await.unwrap());
    assert_eq!(position, 0);
}

#[tokio::test]
async fn lifecycle_guards_reject_out_of_order_calls() {
    let state = running_state().await;
    let engine = state.require_engine().await.unwrap();
    let question = author(&engine, "Esther", "4", "Who said 'for such a time as this'?").await;
    let (game_id, home_id) = create_game(&engine, &[("Esther", "4")]).await;

    assert!(matches!(
        engine.next_question(game_id).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        engine.finish_game(game_id).await,
        Err(ServiceError::InvalidState(_))
    ));

    engine.start_game(game_id).await.unwrap();
    assert!(matches!(
        engine.start_game(game_id).await,
        Err(ServiceError::InvalidState(_))
    ));

    engine.finish_game(game_id).await.unwrap();
    assert!(matches!(
        engine.previous_question(game_id).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        engine
            .submit_team_answer(game_id, home_id, answer_id(&question, true))
            .await,
        Err(ServiceError::InvalidState(_))
    ));

    assert!(matches!(
        engine.start_game(Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn game_subscribers_follow_the_current_question() {
    let state = running_state().await;
    let engine = state.require_engine().await.unwrap();
    author(&engine, "Daniel", "6", "Where was Daniel thrown?").await;
    let (game_id, home_id) = create_game(&engine, &[("Daniel", "6")]).await;

    let mut subscription = live_updates::subscribe(&state, Topic::Game(game_id))
        .await
        .unwrap();
    let snapshot = next_event(&mut subscription).await;
    assert_eq!(snapshot.event.as_deref(), Some("current_question"));
    assert_eq!(snapshot.data["state"], "waiting");

    engine.start_game(game_id).await.unwrap();
    let started = next_event(&mut subscription).await;
    assert_eq!(started.data["state"], "active");
    assert_eq!(started.data["position"], 0);

    let answer = started.data["question"]["answers"][0]["id"]
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap();
    engine
        .submit_team_answer(game_id, home_id, answer)
        .await
        .unwrap();
    let team = next_event(&mut subscription).await;
    assert_eq!(team.event.as_deref(), Some("team_updated"));
    assert_eq!(team.data["name"], "Home");

    engine.next_question(game_id).await.unwrap();
    let finished = next_event(&mut subscription).await;
    assert_eq!(finished.data["state"], "finished");

    state.broadcaster().unsubscribe(subscription.handle);
    assert_eq!(state.broadcaster().subscriber_count(Topic::Game(game_id)), 0);
}
