use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use habito_core::{
    command::Command,
    domain::{ChatId, Habit, UserId},
    errors::Error,
    formatting::escape_html,
    store::PlanStatus,
};

use crate::router::AppState;

const STORAGE_FAILURE: &str =
    "⚠️ No pude guardar el cambio. Inténtalo de nuevo en un momento.";

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    let Some(cmd) = Command::parse(text) else {
        return Ok(());
    };

    tracing::debug!(user_id = user_id.0, command = ?cmd, "command received");

    // Lazy user creation on first interaction, before any operation.
    if let Err(e) = state.store.ensure_user(user_id).await {
        log_failure(user_id, &e);
        send_chunked(&state, chat_id, STORAGE_FAILURE).await;
        return Ok(());
    }

    let reply = match cmd {
        Command::Start => render_start(),
        Command::Help => render_help(),
        Command::Premium => render_premium(state.store.plan_status(user_id).await),
        Command::Add(name) => match state.store.add_habit(user_id, &name).await {
            Ok(habit) => render_added(&habit, state.store.plan_status(user_id).await),
            Err(e) => {
                log_failure(user_id, &e);
                render_error(&e)
            }
        },
        Command::List => render_list(&state.store.list_habits(user_id).await),
        Command::Check(selector) if selector.trim().is_empty() => render_check_usage(),
        Command::Check(selector) => match state.store.check_habit(user_id, &selector).await {
            Ok(habit) => render_checked(&habit),
            Err(e) => {
                log_failure(user_id, &e);
                render_error(&e)
            }
        },
        Command::Unknown(name) => render_unknown(&name),
    };

    send_chunked(&state, chat_id, &reply).await;
    Ok(())
}

fn log_failure(user_id: UserId, e: &Error) {
    if !e.is_domain() {
        tracing::error!(user_id = user_id.0, error = %e, "command failed");
    }
}

async fn send_chunked(state: &AppState, chat_id: ChatId, html: &str) {
    // Headroom under the hard Telegram message limit.
    let limit = state
        .messenger
        .capabilities()
        .max_message_len
        .saturating_sub(96)
        .max(200);

    for chunk in split_lines(html, limit) {
        if let Err(e) = state.messenger.send_html(chat_id, &chunk).await {
            tracing::error!(chat_id = chat_id.0, error = %e, "reply failed");
        }
    }
}

/// Split a line-oriented reply into chunks that fit the messenger limit.
fn split_lines(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();
    for line in text.split('\n') {
        if !chunk.is_empty() && chunk.len() + line.len() + 1 > limit {
            out.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push('\n');
        }
        chunk.push_str(line);
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

// ============== Reply rendering ==============

fn render_start() -> String {
    "¡Hola! Soy tu gestor de hábitos. 💪\n\n\
Registra hábitos con /add, revísalos con /list y marca el progreso del día con /check.\n\n\
Escribe /help para ver todos los comandos."
        .to_string()
}

fn render_help() -> String {
    "📋 <b>Comandos</b>\n\n\
/start - Presentación del bot\n\
/help - Esta ayuda\n\
/add &lt;nombre&gt; - Registrar un hábito nuevo\n\
/list - Ver tus hábitos y su estado de hoy\n\
/check &lt;número o nombre&gt; - Marcar o desmarcar un hábito\n\
/premium - Planes y límite de hábitos\n\n\
💡 /check acepta el número de /list o el nombre exacto del hábito."
        .to_string()
}

fn render_premium(status: PlanStatus) -> String {
    format!(
        "⭐ <b>Planes</b>\n\n\
free - 3 hábitos\n\
pro - 15 hábitos\n\
vip - 999 hábitos\n\n\
Tu plan: <b>{}</b> ({}/{} hábitos usados).\n\n\
El cambio de plan todavía no se gestiona desde el bot; contacta con el administrador.",
        status.plan.as_str(),
        status.count,
        status.limit
    )
}

fn render_added(habit: &Habit, status: PlanStatus) -> String {
    format!(
        "✅ Hábito registrado: <b>{}</b> ({}/{}).",
        escape_html(&habit.name),
        status.count,
        status.limit
    )
}

fn render_list(habits: &[Habit]) -> String {
    if habits.is_empty() {
        return "Todavía no tienes hábitos. Crea el primero con /add &lt;nombre&gt;.".to_string();
    }

    let mut out = String::from("📋 <b>Tus hábitos de hoy:</b>\n");
    for (idx, habit) in habits.iter().enumerate() {
        let mark = if habit.completed_today { "✅" } else { "⬜" };
        out.push_str(&format!(
            "\n{}. {mark} {}",
            idx + 1,
            escape_html(&habit.name)
        ));
    }
    out.push_str("\n\nMarca uno con /check &lt;número o nombre&gt;.");
    out
}

fn render_checked(habit: &Habit) -> String {
    if habit.completed_today {
        format!(
            "✅ <b>{}</b> completado hoy. ¡Bien hecho!",
            escape_html(&habit.name)
        )
    } else {
        format!(
            "⬜ <b>{}</b> vuelve a estar pendiente.",
            escape_html(&habit.name)
        )
    }
}

fn render_check_usage() -> String {
    "Uso: <code>/check número o nombre</code>. Los números salen en /list.".to_string()
}

fn render_unknown(name: &str) -> String {
    format!(
        "Comando desconocido: /{}. Escribe /help para ver los comandos.",
        escape_html(name)
    )
}

fn render_error(e: &Error) -> String {
    match e {
        Error::EmptyName => {
            "El nombre no puede estar vacío. Uso: <code>/add nombre del hábito</code>".to_string()
        }
        Error::DuplicateName { name } => {
            format!("Ya tienes un hábito llamado <b>{}</b>.", escape_html(name))
        }
        Error::LimitReached { limit } => format!(
            "Has llegado al límite de {limit} hábitos de tu plan. Mira /premium para ampliarlo."
        ),
        Error::NotFound { selector } => format!(
            "No encuentro el hábito «{}». Usa /list para ver los números.",
            escape_html(selector)
        ),
        _ => STORAGE_FAILURE.to_string(),
    }
}
