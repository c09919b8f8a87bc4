use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the trivia session backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::games::list_games,
        crate::routes::games::create_game,
        crate::routes::games::get_game,
        crate::routes::games::delete_game,
        crate::routes::games::add_team,
        crate::routes::games::team_report,
        crate::routes::games::home_team,
        crate::routes::games::submit_answer,
        crate::routes::games::retract_answer,
        crate::routes::games::start_game,
        crate::routes::games::next_question,
        crate::routes::games::previous_question,
        crate::routes::games::finish_game,
        crate::routes::games::current_question,
        crate::routes::games::finished_report,
        crate::routes::questions::list_questions,
        crate::routes::questions::create_question,
        crate::routes::questions::get_question,
        crate::routes::questions::delete_question,
        crate::routes::questions::add_answer,
        crate::routes::questions::delete_answer,
        crate::routes::sse::games_stream,
        crate::routes::sse::game_stream,
        crate::routes::websocket::games_socket,
        crate::routes::websocket::game_socket,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::ChapterInput,
            crate::dto::game::CreateTeamRequest,
            crate::dto::game::GameSummary,
            crate::dto::game::TeamSummary,
            crate::dto::game::GameDetails,
            crate::dto::game::QuestionView,
            crate::dto::game::TeamAnswerSummary,
            crate::dto::game::TeamReport,
            crate::dto::game::FinishedGameReport,
            crate::dto::game::SubmitAnswerResponse,
            crate::dto::question::CreateQuestionRequest,
            crate::dto::question::CreateAnswerRequest,
            crate::dto::question::QuestionSummary,
            crate::dto::question::AnswerSummary,
            crate::state::lifecycle::GameStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "games", description = "Game creation and listing"),
        (name = "teams", description = "Teams, their answers and scores"),
        (name = "lifecycle", description = "Start, advance, rewind and finish games"),
        (name = "questions", description = "Question bank authoring"),
        (name = "live", description = "WebSocket and server-sent event subscriptions"),
    )
)]
pub struct ApiDoc;
