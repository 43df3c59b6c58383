use crate::domain::deal::Deal;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct DealRow<'a> {
    deal_id: i64,
    client: i64,
    trader: Option<i64>,
    state: &'a str,
    method: Option<&'a str>,
    amount: Option<String>,
}

impl<'a> From<&'a Deal> for DealRow<'a> {
    fn from(deal: &'a Deal) -> Self {
        Self {
            deal_id: deal.id,
            client: deal.client_id,
            trader: deal.trader_id,
            state: deal.state.label(),
            method: deal.method_name.as_deref(),
            amount: deal.amount.map(|amount| amount.to_string()),
        }
    }
}

/// Writes a deal report as CSV.
pub struct DealWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> DealWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_deals<'a>(&mut self, deals: impl IntoIterator<Item = &'a Deal>) -> Result<()> {
        for deal in deals {
            self.writer.serialize(DealRow::from(deal))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deal::{Amount, DealState};

    #[test]
    fn test_writes_header_and_rows() {
        let mut open = Deal::new(1, 10, 10, 0);
        open.method_name = Some("Card".to_string());
        let mut accepted = Deal::new(2, 11, 11, 0);
        accepted.amount = Some("12,50".parse::<Amount>().unwrap());
        accepted.state = DealState::Accepted;
        accepted.trader_id = Some(200);

        let mut out = Vec::new();
        DealWriter::new(&mut out)
            .write_deals([&open, &accepted])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "deal_id,client,trader,state,method,amount");
        assert_eq!(lines[1], "1,10,,created,Card,");
        assert_eq!(lines[2], "2,11,200,accepted,,12.5");
    }
}
