//! Texts and keyboards of the deal flow.

use crate::domain::deal::Deal;
use crate::domain::ui::{Button, Keyboard};

pub const METHODS_PROMPT: &str = "Choose payment method";
pub const AMOUNT_PROMPT: &str = "Enter the amount";
pub const NO_TRADERS: &str = "No traders";
pub const UNDER_REVIEW: &str = "Under review";

fn field(value: Option<String>, missing: &str) -> String {
    value.unwrap_or_else(|| missing.to_string())
}

/// The client's summary of a deal.
pub fn summary(deal: &Deal) -> String {
    format!(
        "Deal #{}\nStatus: {}\nPayment method: {}\nAmount: {}",
        deal.id,
        deal.state.label(),
        field(deal.method_name.clone(), "not selected"),
        field(deal.amount.map(|a| a.to_string()), "not set"),
    )
}

/// What traders see while the deal waits for them.
pub fn trader_offer(deal: &Deal) -> String {
    format!(
        "New deal #{} from client {}\nPayment method: {}\nAmount: {}",
        deal.id,
        deal.client_id,
        field(deal.method_name.clone(), "not selected"),
        field(deal.amount.map(|a| a.to_string()), "not set"),
    )
}

pub fn accepted_by_you(deal: &Deal) -> String {
    format!("{}\n\nYou accepted this deal.", trader_offer(deal))
}

pub fn taken_by_other(deal_id: i64) -> String {
    format!("Deal #{deal_id} was accepted by another trader.")
}

pub fn closed_by_you(deal: &Deal) -> String {
    format!("{}\n\nDeal closed.", trader_offer(deal))
}

pub fn expired_notice(deal_id: i64) -> String {
    format!("Nobody accepted deal #{deal_id} in time.")
}

pub fn amount_timed_out(deal_id: i64) -> String {
    format!("Time to enter the amount for deal #{deal_id} has run out.")
}

pub fn invalid_amount(input: &str) -> String {
    format!("Incorrect amount \"{input}\", enter it again")
}

fn submit_button(deal_id: i64, warning: Option<&str>) -> Button {
    let text = match warning {
        Some(warning) => format!("[{warning}] Submit again"),
        None => "Submit".to_string(),
    };
    Button::new(text, format!("callback_deal_sented:{deal_id}"))
}

/// Editing controls under the client's summary.
///
/// `warning` flags a failed submission on the submit button. When nobody
/// can take the deal the editing row is pointless and is dropped.
pub fn client_keyboard(deal_id: i64, warning: Option<&str>) -> Keyboard {
    let mut rows = Vec::with_capacity(2);
    if warning != Some(NO_TRADERS) {
        rows.push(vec![
            Button::new(METHODS_PROMPT, format!("callback_deal_menu_methods:{deal_id}")),
            Button::new("Enter amount", format!("callback_deal_amount:{deal_id}")),
        ]);
    }
    rows.push(vec![submit_button(deal_id, warning)]);
    Keyboard::new(rows)
}

pub fn review_keyboard(deal_id: i64) -> Keyboard {
    Keyboard::new(vec![vec![submit_button(deal_id, Some(UNDER_REVIEW))]])
}

pub fn methods_keyboard(deal_id: i64, methods: &[String]) -> Keyboard {
    Keyboard::new(
        methods
            .iter()
            .map(|method| {
                vec![Button::new(
                    method.as_str(),
                    format!("callback_deal_method:{method}:{deal_id}"),
                )]
            })
            .collect(),
    )
}

pub fn accept_keyboard(deal_id: i64) -> Keyboard {
    Keyboard::new(vec![vec![Button::new(
        "Accept",
        format!("callback_deal_accept:{deal_id}"),
    )]])
}

pub fn close_keyboard(deal_id: i64) -> Keyboard {
    Keyboard::new(vec![vec![Button::new(
        "Close deal",
        format!("callback_deal_close:{deal_id}"),
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deal::Amount;

    #[test]
    fn test_summary_lists_missing_fields() {
        let mut deal = Deal::new(7, 1, 1, 0);
        assert_eq!(
            summary(&deal),
            "Deal #7\nStatus: created\nPayment method: not selected\nAmount: not set"
        );
        deal.amount = Some("100".parse::<Amount>().unwrap());
        deal.refresh_draft_state();
        assert!(summary(&deal).ends_with("Amount: 100"));
    }

    #[test]
    fn test_client_keyboard_variants() {
        let plain = client_keyboard(7, None);
        assert_eq!(plain.0.len(), 2);
        assert_eq!(plain.0[1][0].text, "Submit");
        assert_eq!(plain.0[1][0].callback_data, "callback_deal_sented:7");

        let warned = client_keyboard(7, Some("No amount"));
        assert_eq!(warned.0[1][0].text, "[No amount] Submit again");

        let no_traders = client_keyboard(7, Some(NO_TRADERS));
        assert_eq!(no_traders.0.len(), 1);
        assert_eq!(no_traders.0[0][0].text, "[No traders] Submit again");
    }
}
