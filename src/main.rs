mod config;
mod handlers;
mod pending;
mod study;

use std::sync::Arc;

use chatgpt::client::ChatGPT;
use config::Config;
use dotenv::dotenv;
use pending::SingleFlight;
use study::{
    ai_helper::{StudyAssistant, StudyHelper},
    quiz::QuizSession,
    store::{DirStorage, LessonStore},
    LessonDraft, LessonId,
};
use teloxide::{
    dispatching::{
        dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
        UpdateHandler,
    },
    prelude::*,
};

/// Where a chat is in the conversation. Persisted between updates, so
/// everything a screen needs lives in its variant.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Menu,
    ReceiveCreationMode,
    ReceiveTopic,
    ReceiveTitle,
    ReceiveWeek {
        draft: LessonDraft,
    },
    ReceiveCourse {
        draft: LessonDraft,
    },
    ReceiveNotes {
        draft: LessonDraft,
    },
    ReceiveImages {
        draft: LessonDraft,
    },
    BrowseLessons {
        listed: Vec<LessonId>,
    },
    ViewLesson {
        lesson_id: LessonId,
    },
    ConfirmDelete {
        lesson_id: LessonId,
    },
    TakingQuiz {
        session: QuizSession,
    },
    StudyBuddy,
}

type DialogueStorage = std::sync::Arc<ErasedStorage<State>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting study notes bot...");

    let config = Config::from_env()?;
    let bot = Bot::from_env();

    log::info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db, Json).await?.erase();

    log::info!("Lessons are kept under {}", config.data_dir.display());
    let store = LessonStore::new(DirStorage::open(&config.data_dir)?);

    let gpt = {
        let mut gpt = ChatGPT::new(config.chatgpt_api_key.as_str())?;

        gpt.config.engine = config.chatgpt_engine;
        gpt.config.timeout = config.chatgpt_timeout;

        gpt
    };
    let assistant: Arc<dyn StudyAssistant> = Arc::new(StudyHelper::new(gpt));
    let flights = Arc::new(SingleFlight::default());

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![storage, store, assistant, flights])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;
    use handlers::{buddy, editor, lessons, quiz};

    Update::filter_message()
        .enter_dialogue::<Message, ErasedStorage<State>, State>()
        // Always available, whatever the chat was doing
        .branch(
            dptree::filter(|msg: Message| matches!(msg.text(), Some("/start" | "/menu")))
                .endpoint(handlers::start),
        )
        .branch(case![State::Start].endpoint(handlers::start))
        .branch(case![State::Menu].endpoint(handlers::receive_menu_choice))
        .branch(case![State::ReceiveCreationMode].endpoint(editor::receive_creation_mode))
        .branch(case![State::ReceiveTopic].endpoint(editor::receive_topic))
        .branch(case![State::ReceiveTitle].endpoint(editor::receive_title))
        .branch(case![State::ReceiveWeek { draft }].endpoint(editor::receive_week))
        .branch(case![State::ReceiveCourse { draft }].endpoint(editor::receive_course))
        .branch(case![State::ReceiveNotes { draft }].endpoint(editor::receive_notes))
        .branch(case![State::ReceiveImages { draft }].endpoint(editor::receive_images))
        .branch(case![State::BrowseLessons { listed }].endpoint(lessons::receive_lesson_choice))
        .branch(case![State::ViewLesson { lesson_id }].endpoint(lessons::receive_lesson_action))
        .branch(
            case![State::ConfirmDelete { lesson_id }]
                .endpoint(lessons::receive_delete_confirmation),
        )
        .branch(case![State::TakingQuiz { session }].endpoint(quiz::receive_quiz_answer))
        .branch(case![State::StudyBuddy].endpoint(buddy::receive_buddy_action))
}
