use crate::dispatch::CommandRegistry;
use crate::helpers::words;

const TOPSY_URL: &str = "http://topsy.com/analytics";
const HELP_COMMANDS: [&str; 3] = ["ayuda", "hola", "topsy"];

fn cmd_ayuda() -> String {
    let listed: Vec<String> = HELP_COMMANDS.iter().map(|c| format!("!{c}")).collect();
    format!(
        "Soy un bot. Los comandos disponibles son: {}. Para ver la ayuda de cada comando, escribe !ayuda comando",
        listed.join(", ")
    )
}

fn cmd_hola(sender: &str, content: &str) -> String {
    match words(content).as_slice() {
        [_] => format!("Hola {sender}!"),
        [_, who] => format!("Hola {who}! de parte de {sender}"),
        _ => "Hola!".to_string(),
    }
}

/// Up to three search terms become `q1`..`q3`; anything after is ignored.
fn cmd_topsy(content: &str) -> String {
    let terms = words(content);
    let query: Vec<String> = terms
        .iter()
        .skip(1)
        .take(3)
        .enumerate()
        .map(|(i, term)| format!("q{}={term}", i + 1))
        .collect();
    if query.is_empty() {
        TOPSY_URL.to_string()
    } else {
        format!("{TOPSY_URL}?{}", query.join("&"))
    }
}

pub(crate) fn register(registry: &mut CommandRegistry) {
    registry.register_full("ayuda", |_, outbox| {
        outbox.send(cmd_ayuda());
        Ok(())
    });
    registry.register_full("hola", |record, outbox| {
        outbox.send(cmd_hola(&record.sender, &record.content));
        Ok(())
    });
    registry.register_full("topsy", |record, outbox| {
        outbox.send(cmd_topsy(&record.content));
        Ok(())
    });
}
