use log::{debug, info};

use crate::api::{ApiResponse, TrackerRepository};
use crate::invoice::{InvoiceRequest, InvoiceResponse};

/// 請求書の生成リクエストを管理するセッション。
pub struct InvoiceSession<'a, T: TrackerRepository> {
    api: &'a T,
    pending: bool,
    error: Option<String>,
    last_invoice: Option<InvoiceResponse>,
}

impl<'a, T: TrackerRepository> InvoiceSession<'a, T> {
    pub fn new(api: &'a T) -> Self {
        Self {
            api,
            pending: false,
            error: None,
            last_invoice: None,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_invoice(&self) -> Option<&InvoiceResponse> {
        self.last_invoice.as_ref()
    }

    #[cfg(test)]
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    #[cfg(test)]
    pub fn clear_last_invoice(&mut self) {
        self.last_invoice = None;
    }

    /// 請求書を生成する。
    ///
    /// 失敗した場合は`None`を返し、エラーを保持する。直前に生成した請求書は失敗しても残る。
    pub async fn generate(&mut self, request: &InvoiceRequest) -> Option<&InvoiceResponse> {
        self.pending = true;
        self.error = None;

        let result = self.api.generate_invoice(request).await;
        self.pending = false;

        match result {
            Ok(ApiResponse {
                success: true,
                data: Some(invoice),
                ..
            }) => {
                info!("Invoice generated: {}", invoice.message);
                self.last_invoice = Some(invoice);
                self.last_invoice.as_ref()
            }
            Ok(response) => {
                self.error = Some(
                    response
                        .error
                        .unwrap_or_else(|| "Failed to generate invoice".to_string()),
                );
                None
            }
            Err(err) => {
                debug!("Invoice request failed with status {}", err.status());
                self.error = Some(err.to_string());
                None
            }
        }
    }
}
