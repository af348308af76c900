use anyhow::Result;
use cartwright_core_types::{Chat, ChatId, Item};
use serde_json::json;

use super::commands::{AddArgs, ChatArgs, SetLocationArgs};
use super::context::CliContext;

pub async fn cmd_add(args: AddArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let chat_id = ChatId::new(args.chat_id);
    let items = services.desk.add_items(&chat_id, &args.text.join(" ")).await?;
    ctx.output().emit(&items, |items| {
        if items.is_empty() {
            "No items recognised.".to_string()
        } else {
            format!("Added {} item(s):\n{}", items.len(), render_items(items))
        }
    })
}

pub async fn cmd_list(args: ChatArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let items = services.desk.list(&ChatId::new(args.chat_id)).await?;
    ctx.output().emit(&items, |items| {
        if items.is_empty() {
            "The list is empty.".to_string()
        } else {
            render_items(items)
        }
    })
}

pub async fn cmd_clear(args: ChatArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let removed = services.desk.clear(&ChatId::new(args.chat_id)).await?;
    ctx.output()
        .emit(&json!({ "removed": removed }), |_| format!("Removed {removed} item(s)."))
}

pub async fn cmd_set_location(args: SetLocationArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let chat = services
        .desk
        .set_location(&ChatId::new(args.chat_id), &args.postal_code, args.mode, args.store)
        .await?;
    ctx.output().emit(&chat, describe_chat)
}

fn describe_chat(chat: &Chat) -> String {
    let mut line = format!(
        "Location set: {} ({})",
        chat.postal_code.as_deref().unwrap_or("-"),
        chat.fulfillment_mode
    );
    if let Some(store) = &chat.store {
        line.push_str(&format!(", store {store}"));
    }
    line
}

pub(crate) fn render_items(items: &[Item]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut line = format!("{:>3}. {} x{}", idx + 1, item.label(), item.quantity);
            if let Some(ceiling) = item.max_price {
                line.push_str(&format!(" (max ${ceiling:.2})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_render_with_constraints() {
        let items = vec![
            Item::new("milk", 2).with_brand("Natrel"),
            Item::new("eggs", 1).with_max_price(5.0),
        ];
        assert_eq!(
            render_items(&items),
            "  1. Natrel milk x2\n  2. eggs x1 (max $5.00)"
        );
    }
}
