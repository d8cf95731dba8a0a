use crate::database::StoredInvoice;

/// Read-only text projection of one invoice, tagged with its identifier and
/// upload-order position. Never persisted; rebuilt from the store on every
/// query.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    pub customer_id: i64,
    /// Rank under ascending identifier order, 1 = oldest. None in the
    /// latest-only projection, which carries no position line.
    pub position: Option<usize>,
    pub content: String,
}

/// Project the full invoice list (ascending identifier) into one document
/// per record. Positions are assigned here, 1..=N, independent of any gaps
/// in the identifier sequence.
pub fn build_corpus(invoices: &[StoredInvoice]) -> Vec<InvoiceDocument> {
    let total = invoices.len();
    invoices
        .iter()
        .enumerate()
        .map(|(idx, invoice)| {
            let position = idx + 1;
            let content = format!(
                "Customer ID: {}\n\
                 Upload Order: {} (1 = Oldest, {} = Newest)\n\
                 Invoice Number: {}\n\
                 Customer: {}\n\
                 Supplier: {}\n\
                 Date: {}\n\
                 Items: {}\n\
                 Total Amount: {}",
                invoice.customer_id,
                position,
                total,
                invoice.invoice_number,
                invoice.customer,
                invoice.supplier,
                invoice.invoice_date,
                invoice.items,
                invoice.total_amount
            );
            InvoiceDocument {
                customer_id: invoice.customer_id,
                position: Some(position),
                content,
            }
        })
        .collect()
}

/// Single-document projection of the newest record, used for lightweight
/// "summarize it" handling. Same field rendering, no Upload Order line.
pub fn build_latest(invoice: &StoredInvoice) -> InvoiceDocument {
    let content = format!(
        "Invoice Number: {}\n\
         Customer: {}\n\
         Supplier: {}\n\
         Date: {}\n\
         Items: {}\n\
         Total Amount: {}\n\
         Customer ID: {}",
        invoice.invoice_number,
        invoice.customer,
        invoice.supplier,
        invoice.invoice_date,
        invoice.items,
        invoice.total_amount,
        invoice.customer_id
    );
    InvoiceDocument {
        customer_id: invoice.customer_id,
        position: None,
        content,
    }
}
