//! Checkout submission: turns a cart and checkout form into either a created
//! order (cash on delivery, or payment already verified) or a payment
//! session at the gateway that creates the order once paid.
//!
//! Every capability the flow touches is injected, so the orchestrator runs
//! the same against the storefront and against test doubles. Failures are
//! never returned as errors: each one is toasted and reported as
//! [`CheckoutOutcome::Failed`].

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::order::CreatedOrder;
use crate::backend::retry::RetryPolicy;
use crate::logging::mask_email;
use crate::payments::client::PaymentApi;
use crate::payments::gateway::string_field;
use crate::payments::types::{
    InitiatePaymentRequest, InitiatePaymentResponse, PaymentMethod, RetryPaymentRequest,
};
use crate::services::orders::{
    OrderDraft, OrderHeader, OrderLineItem, OrderService, OrderServiceError, OrderStatus,
};
use crate::services::payment_linker::{LinkOutcome, PaymentLinker, PAYMENT_REFERENCE_KEY};
use crate::services::session_storage::SessionStorage;

pub const VALIDATION_FALLBACK_MESSAGE: &str = "Please fix the highlighted errors and try again.";
pub const LINK_INCOMPLETE_MESSAGE: &str =
    "Order created but payment linking did not complete. Please check your orders page.";
pub const GATEWAY_REDIRECT_MESSAGE: &str = "Redirecting to payment gateway...";
pub const PAYMENT_PAGE_REDIRECT_MESSAGE: &str = "Redirecting to payment page...";
const ADMIN_DISABLED_MESSAGE: &str = "Ordering is currently disabled by the admin.";
const GUEST_CUSTOMER_NAME: &str = "Guest Customer";
const GUEST_EMAIL_DOMAIN: &str = "nihemart.rw";

static RWANDA_MSISDN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^2507\d{8}$").ok());

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Cart line id; for variations this is `<productId>-<variationId>`.
    pub id: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub variation_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub variation_name: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub delivery_notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedAddress {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// The signed-in customer, absent for guest checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl From<&crate::backend::session::AuthUser> for CustomerIdentity {
    fn from(user: &crate::backend::session::AuthUser) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrdersSource {
    Admin,
    Schedule,
}

/// The orders-enabled flag as the checkout page last read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersAvailability {
    pub enabled: bool,
    #[serde(default)]
    pub source: Option<OrdersSource>,
    #[serde(default)]
    pub message: Option<String>,
    /// The shopper ticked "deliver tomorrow during working hours".
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub schedule_notes: Option<String>,
}

impl Default for OrdersAvailability {
    fn default() -> Self {
        Self {
            enabled: true,
            source: None,
            message: None,
            confirmed: false,
            schedule_notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    pub form: CheckoutForm,
    pub selected_address: Option<SelectedAddress>,
    pub derived_city: Option<String>,
    pub subtotal: Decimal,
    pub transport: Decimal,
    pub total: Decimal,
    /// `None` means cash on delivery.
    pub payment_method: Option<PaymentMethod>,
    pub payment_verified: bool,
    pub retry_order_id: Option<String>,
    /// Per-method phone numbers entered in the mobile-money picker.
    pub mobile_money_phones: HashMap<String, String>,
    pub customer: Option<CustomerIdentity>,
    pub availability: OrdersAvailability,
}

impl CheckoutRequest {
    fn method(&self) -> PaymentMethod {
        self.payment_method
            .clone()
            .unwrap_or(PaymentMethod::CashOnDelivery)
    }

    fn address_phone(&self) -> Option<&str> {
        self.selected_address
            .as_ref()
            .and_then(|a| a.phone.as_deref())
            .filter(|p| !p.is_empty())
    }
}

// ============================================================================
// Capabilities
// ============================================================================

pub trait Navigator: Send + Sync {
    /// In-app navigation.
    fn push(&self, path: &str);

    /// Leave the storefront, e.g. for the gateway checkout page.
    fn redirect(&self, url: &str);
}

pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn info(&self, message: &str);
}

pub trait CheckoutUi: Send + Sync {
    fn set_payment_in_progress(&self, value: bool);
    fn set_suppress_empty_cart_redirect(&self, value: bool);
    fn set_prevent_persistence(&self, value: bool);
    fn clear_cart(&self);
    fn clear_checkout_state(&self);
    fn set_errors(&self, errors: &FieldErrors);
}

/// Field name and message, in display order.
pub type FieldErrors = Vec<(String, String)>;

pub trait FormValidator: Send + Sync {
    fn validate(&self, form: &CheckoutForm, address: Option<&SelectedAddress>) -> FieldErrors;
}

/// Required name, a reachable phone, an address and a plausible email.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFormValidator;

impl FormValidator for StandardFormValidator {
    fn validate(&self, form: &CheckoutForm, address: Option<&SelectedAddress>) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if form.full_name.trim().is_empty() {
            errors.push(("fullName".into(), "Full name is required".into()));
        }

        let email = form.email.trim();
        if !email.is_empty() && !(email.contains('@') && email.contains('.')) {
            errors.push(("email".into(), "Please enter a valid email address".into()));
        }

        let address_phone = address.and_then(|a| a.phone.as_deref()).unwrap_or("");
        if form.phone.trim().is_empty() && address_phone.trim().is_empty() {
            errors.push(("phone".into(), "Phone number is required".into()));
        }

        let has_address = address
            .map(|a| a.street.is_some() || a.display_name.is_some())
            .unwrap_or(false);
        if !has_address && form.address.trim().is_empty() {
            errors.push(("address".into(), "Delivery address is required".into()));
        }

        errors
    }
}

pub struct CheckoutPorts {
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentApi>,
    pub storage: Arc<dyn SessionStorage>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    pub ui: Arc<dyn CheckoutUi>,
    pub validator: Arc<dyn FormValidator>,
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Storefront origin used to build gateway return URLs.
    pub origin: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
        }
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Each variant renders as the toast shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("Your cart is empty.")]
    EmptyCart,

    #[error("{0}")]
    OrdersDisabled(String),

    #[error("Please confirm you want this order delivered tomorrow during working hours.")]
    ScheduleNotConfirmed,

    #[error("Failed to create order: {0}")]
    OrderCreation(String),

    #[error("Invalid product data. Please refresh and try again.")]
    InvalidProductData,

    #[error("Product no longer available. Please update your cart.")]
    ProductUnavailable,

    #[error("Payment retry failed. Please try again.")]
    RetryFailed,

    #[error("{0}")]
    RetryRequest(String),

    #[error("Payment validation failed: {0}")]
    PaymentValidation(String),

    #[error("Payment initiation failed: {0}")]
    PaymentInitiation(String),

    #[error("{0}")]
    PaymentRequest(String),

    #[error("Payment initiated but checkout URL not available. Please contact support.")]
    MissingCheckoutUrl,

    #[error("Payment initiated but no redirect URL available. Please check your payment status.")]
    MissingRedirect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    /// A submission was already running.
    Ignored,
    Failed(CheckoutError),
    OrderPlaced {
        order_id: String,
        order_number: Option<String>,
        redirect_to: String,
        link: Option<LinkOutcome>,
    },
    GatewayRedirect {
        url: String,
        reference: Option<String>,
    },
    PaymentPage {
        path: String,
    },
}

// ============================================================================
// Helpers
// ============================================================================

/// Product id for an order line. Variation lines carry
/// `<36-char product uuid>-<variation id>` as their cart id.
pub fn resolve_product_id(product_id: Option<&str>, cart_id: &str) -> String {
    if let Some(id) = product_id.filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    if cart_id.len() >= 73 && cart_id.as_bytes().get(36) == Some(&b'-') {
        if let Some(prefix) = cart_id.get(..36) {
            return prefix.to_string();
        }
    }
    cart_id.to_string()
}

/// The form email, or a synthetic guest address built from the phone digits
/// (or `fallback_millis` when no digits are available).
pub fn derive_customer_email(email: &str, phone: &str, fallback_millis: i64) -> String {
    let email = email.trim();
    if !email.is_empty() {
        return email.to_string();
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let local = if digits.is_empty() {
        fallback_millis.to_string()
    } else {
        digits
    };
    format!("guest-{}@{}", local, GUEST_EMAIL_DOMAIN)
}

/// Rwandan phone input in `2507XXXXXXXX` form.
pub fn normalize_msisdn(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(rest) = digits.strip_prefix('0') {
        return format!("250{}", rest);
    }
    if digits.len() == 9 {
        return format!("250{}", digits);
    }
    digits
}

pub fn validate_payment_request(request: &InitiatePaymentRequest) -> Vec<String> {
    let mut errors = Vec::new();

    if !request.amount.map(|a| a > Decimal::ZERO).unwrap_or(false) {
        errors.push("Amount must be greater than 0".to_string());
    }
    if request
        .customer_name
        .as_deref()
        .map(|n| n.trim().is_empty())
        .unwrap_or(true)
    {
        errors.push("Customer name is required".to_string());
    }
    match &request.payment_method {
        None => errors.push("Payment method is required".to_string()),
        Some(method) if method.as_str().is_empty() => {
            errors.push("Payment method is required".to_string())
        }
        Some(method) if method.is_mobile_money() => {
            let phone = request.customer_phone.as_deref().unwrap_or("");
            let valid = RWANDA_MSISDN
                .as_ref()
                .map(|re| re.is_match(phone))
                .unwrap_or(false);
            if !valid {
                errors.push(
                    "A valid Rwandan mobile number (2507XXXXXXXX) is required for mobile money payments"
                        .to_string(),
                );
            }
        }
        Some(_) => {}
    }

    errors
}

fn first_text(value: Option<&serde_json::Value>, fields: &[&str]) -> Option<String> {
    let value = value?;
    fields.iter().find_map(|field| string_field(value, field))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Resets the submitting flag on every exit path.
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitGuard(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the customer-facing fields resolved to.
struct Customer {
    full_name: String,
    email: String,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct CheckoutOrchestrator {
    orders: Arc<dyn OrderService>,
    payments: Arc<dyn PaymentApi>,
    storage: Arc<dyn SessionStorage>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    ui: Arc<dyn CheckoutUi>,
    validator: Arc<dyn FormValidator>,
    linker: PaymentLinker,
    config: CheckoutConfig,
    submitting: AtomicBool,
}

impl CheckoutOrchestrator {
    pub fn new(ports: CheckoutPorts, config: CheckoutConfig) -> Self {
        let linker = PaymentLinker::new(ports.payments.clone(), ports.storage.clone());
        Self {
            orders: ports.orders,
            payments: ports.payments,
            storage: ports.storage,
            navigator: ports.navigator,
            notifier: ports.notifier,
            ui: ports.ui,
            validator: ports.validator,
            linker,
            config,
            submitting: AtomicBool::new(false),
        }
    }

    pub fn with_link_policy(mut self, policy: RetryPolicy) -> Self {
        self.linker = self.linker.with_policy(policy);
        self
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    pub async fn submit(&self, request: &CheckoutRequest) -> CheckoutOutcome {
        let Some(_guard) = SubmitGuard::acquire(&self.submitting) else {
            debug!("checkout submission already in progress");
            return CheckoutOutcome::Ignored;
        };

        let mut navigated_to_order = false;
        let outcome = match self.prepare(request) {
            Ok((draft, customer)) => {
                self.dispatch(request, draft, customer, &mut navigated_to_order)
                    .await
            }
            Err(e) => CheckoutOutcome::Failed(e),
        };

        if !navigated_to_order {
            self.ui.set_suppress_empty_cart_redirect(false);
        }
        if let CheckoutOutcome::Failed(error) = &outcome {
            warn!(error = %error, "checkout did not complete");
            self.notifier.error(&error.to_string());
        }
        outcome
    }

    async fn dispatch(
        &self,
        request: &CheckoutRequest,
        draft: OrderDraft,
        customer: Customer,
        navigated_to_order: &mut bool,
    ) -> CheckoutOutcome {
        let method = request.method();
        if method.is_cash_on_delivery() {
            return self
                .cash_on_delivery(request, &draft, navigated_to_order)
                .await;
        }
        if request.payment_verified {
            return self
                .verified_payment(request, &draft, navigated_to_order)
                .await;
        }
        if let Some(order_id) = request.retry_order_id.as_deref().filter(|id| !id.is_empty()) {
            return self.retry_payment(request, order_id, &customer).await;
        }
        self.deferred_payment(request, draft, &customer).await
    }

    /// Validation, availability checks and the order draft.
    fn prepare(&self, request: &CheckoutRequest) -> Result<(OrderDraft, Customer), CheckoutError> {
        let errors = self
            .validator
            .validate(&request.form, request.selected_address.as_ref());
        if !errors.is_empty() {
            self.ui.set_errors(&errors);
            let message = errors
                .iter()
                .map(|(_, message)| message.as_str())
                .find(|m| !m.is_empty())
                .unwrap_or(VALIDATION_FALLBACK_MESSAGE);
            return Err(CheckoutError::Validation(message.to_string()));
        }

        if request.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        self.ui.set_errors(&FieldErrors::new());

        let availability = &request.availability;
        let mut schedule_notes = None;
        if !availability.enabled {
            match availability.source {
                Some(OrdersSource::Admin) => {
                    let message = non_empty(availability.message.as_deref())
                        .unwrap_or_else(|| ADMIN_DISABLED_MESSAGE.to_string());
                    return Err(CheckoutError::OrdersDisabled(message));
                }
                Some(OrdersSource::Schedule) => {
                    if !availability.confirmed {
                        return Err(CheckoutError::ScheduleNotConfirmed);
                    }
                    schedule_notes = non_empty(availability.schedule_notes.as_deref());
                }
                None => {}
            }
        }

        let form = &request.form;
        let address = request.selected_address.as_ref();

        let full_name = request
            .customer
            .as_ref()
            .and_then(|c| non_empty(c.full_name.as_deref()))
            .unwrap_or_else(|| form.full_name.trim().to_string());
        let (first_name, last_name) = match full_name.split_once(' ') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => (full_name.clone(), String::new()),
        };

        let email_phone = non_empty(Some(form.phone.as_str()))
            .or_else(|| request.address_phone().map(|p| p.to_string()))
            .unwrap_or_default();
        let email = derive_customer_email(
            &form.email,
            &email_phone,
            chrono::Utc::now().timestamp_millis(),
        );

        let city = non_empty(request.derived_city.as_deref())
            .or_else(|| address.and_then(|a| non_empty(a.city.as_deref())))
            .unwrap_or_else(|| form.city.trim().to_string());
        let delivery_address = address
            .and_then(|a| a.street.clone().or_else(|| a.display_name.clone()))
            .unwrap_or_else(|| form.address.clone())
            .trim()
            .to_string();
        let customer_phone = non_empty(request.address_phone()).or_else(|| non_empty(Some(form.phone.as_str())));

        let items = request
            .items
            .iter()
            .map(|item| OrderLineItem {
                product_id: resolve_product_id(item.product_id.as_deref(), &item.id),
                product_variation_id: item.variation_id.clone(),
                product_name: item.name.clone(),
                product_sku: item.sku.clone(),
                variation_name: item.variation_name.clone(),
                price: item.price,
                quantity: item.quantity,
                total: OrderLineItem::line_total(item.price, item.quantity),
            })
            .collect();

        let draft = OrderDraft {
            order: OrderHeader {
                user_id: request.customer.as_ref().map(|c| c.id.clone()),
                subtotal: request.subtotal,
                tax: request.transport,
                total: request.total,
                customer_email: email.clone(),
                customer_first_name: first_name.trim().to_string(),
                customer_last_name: last_name.trim().to_string(),
                customer_phone,
                delivery_address,
                delivery_city: city,
                status: OrderStatus::Pending,
                payment_method: request.method(),
                delivery_notes: non_empty(Some(form.delivery_notes.as_str())),
                schedule_notes,
            },
            items,
        };

        Ok((draft, Customer { full_name, email }))
    }

    fn payment_phone(&self, request: &CheckoutRequest) -> String {
        let method = request.method();
        let typed = if method.is_mobile_money() {
            non_empty(request.mobile_money_phones.get(method.as_str()).map(|p| p.as_str()))
        } else {
            None
        };
        let raw = typed
            .or_else(|| request.address_phone().map(|p| p.to_string()))
            .unwrap_or_else(|| request.form.phone.clone());
        normalize_msisdn(&raw)
    }

    fn payment_customer_name(&self, customer: &Customer, request: &CheckoutRequest) -> String {
        non_empty(Some(customer.full_name.as_str()))
            .or_else(|| non_empty(Some(request.form.full_name.as_str())))
            .unwrap_or_else(|| GUEST_CUSTOMER_NAME.to_string())
    }

    /// Pushes the post-order page. Signed-in customers land on the order.
    fn navigate_after_order(
        &self,
        request: &CheckoutRequest,
        created: &CreatedOrder,
        navigated_to_order: &mut bool,
    ) -> String {
        let path = if request.customer.is_some() {
            *navigated_to_order = true;
            format!("/orders/{}", created.id)
        } else {
            "/thank-you".to_string()
        };
        self.navigator.push(&path);
        path
    }

    fn announce_order(&self, created: &CreatedOrder) {
        let number = created.order_number.as_deref().unwrap_or(&created.id);
        self.notifier
            .success(&format!("Order #{} has been created successfully!", number));
    }

    // ------------------------------------------------------------------------
    // Branches
    // ------------------------------------------------------------------------

    async fn verified_payment(
        &self,
        request: &CheckoutRequest,
        draft: &OrderDraft,
        navigated_to_order: &mut bool,
    ) -> CheckoutOutcome {
        self.ui.set_suppress_empty_cart_redirect(true);
        self.ui.set_prevent_persistence(true);

        let created = match self.orders.create_order(draft).await {
            Ok(created) => created,
            Err(e) => {
                self.ui.set_payment_in_progress(false);
                self.ui.set_prevent_persistence(false);
                return CheckoutOutcome::Failed(CheckoutError::OrderCreation(describe(&e)));
            }
        };

        self.ui.clear_cart();
        self.ui.clear_checkout_state();
        let redirect_to = self.navigate_after_order(request, &created, navigated_to_order);

        let link = self.linker.link(&created.id).await;
        if !link.succeeded() {
            self.notifier.info(LINK_INCOMPLETE_MESSAGE);
        }
        self.announce_order(&created);

        info!(
            order_id = %created.id,
            link = ?link,
            "order created for verified payment"
        );
        CheckoutOutcome::OrderPlaced {
            order_id: created.id,
            order_number: created.order_number,
            redirect_to,
            link: Some(link),
        }
    }

    async fn retry_payment(
        &self,
        request: &CheckoutRequest,
        order_id: &str,
        customer: &Customer,
    ) -> CheckoutOutcome {
        self.ui.set_payment_in_progress(true);

        let retry = RetryPaymentRequest {
            order_id: Some(order_id.to_string()),
            amount: Some(request.total),
            customer_name: Some(self.payment_customer_name(customer, request)),
            customer_email: Some(request.form.email.trim().to_string()),
            customer_phone: Some(self.payment_phone(request)),
            payment_method: Some(request.method()),
            redirect_url: Some(format!(
                "{}/payment/{}",
                self.config.origin.trim_end_matches('/'),
                order_id
            )),
        };

        let response = match self.payments.retry(&retry).await {
            Ok(response) => response,
            Err(e) => {
                self.ui.set_payment_in_progress(false);
                let message = e
                    .user_message()
                    .unwrap_or_else(|| "Failed to retry payment. Please try again.".to_string());
                return CheckoutOutcome::Failed(CheckoutError::RetryRequest(message));
            }
        };

        if response.success && response.data.is_some() {
            let url = first_text(response.data.as_ref(), &["url", "redirecturl"])
                .or_else(|| non_empty(response.checkout_url.as_deref()));
            if let Some(url) = url {
                self.notifier.success(GATEWAY_REDIRECT_MESSAGE);
                self.navigator.redirect(&url);
                return CheckoutOutcome::GatewayRedirect {
                    url,
                    reference: response.reference,
                };
            }

            let payment_id = non_empty(response.payment_id.as_deref())
                .or_else(|| first_text(response.data.as_ref(), &["paymentId"]));
            if let Some(payment_id) = payment_id {
                let path = format!("/payment/{}", payment_id);
                self.notifier.success(PAYMENT_PAGE_REDIRECT_MESSAGE);
                self.navigator.push(&path);
                return CheckoutOutcome::PaymentPage { path };
            }
        }

        self.ui.set_payment_in_progress(false);
        CheckoutOutcome::Failed(CheckoutError::RetryFailed)
    }

    async fn deferred_payment(
        &self,
        request: &CheckoutRequest,
        draft: OrderDraft,
        customer: &Customer,
    ) -> CheckoutOutcome {
        self.ui.set_suppress_empty_cart_redirect(true);
        self.ui.set_payment_in_progress(true);

        let method = request.method();
        let phone = self.payment_phone(request);
        let name = self.payment_customer_name(customer, request);
        let order_data = match serde_json::to_value(&draft) {
            Ok(value) => value,
            Err(e) => {
                self.ui.set_payment_in_progress(false);
                return CheckoutOutcome::Failed(CheckoutError::PaymentRequest(e.to_string()));
            }
        };

        let initiate = InitiatePaymentRequest {
            order_data: Some(order_data),
            amount: Some(request.total),
            customer_name: Some(name.clone()),
            customer_email: Some(request.form.email.trim().to_string()),
            customer_phone: Some(phone.clone()),
            customer_number: Some(phone),
            payment_method: Some(method.clone()),
            order_details: Some(format!("Order for {}", name)),
            ..Default::default()
        };

        let problems = validate_payment_request(&initiate);
        if let Some(first) = problems.into_iter().next() {
            self.ui.set_payment_in_progress(false);
            return CheckoutOutcome::Failed(CheckoutError::PaymentValidation(first));
        }

        info!(
            payment_method = %method,
            amount = %request.total,
            customer_email = %mask_email(&customer.email),
            "initiating payment before order creation"
        );

        let response = match self.payments.initiate(&initiate).await {
            Ok(response) => response,
            Err(e) => {
                self.ui.set_payment_in_progress(false);
                let message = e
                    .user_message()
                    .unwrap_or_else(|| "Failed to start payment. Please try again.".to_string());
                return CheckoutOutcome::Failed(CheckoutError::PaymentRequest(message));
            }
        };

        if !response.success {
            self.ui.set_payment_in_progress(false);
            let reason = non_empty(response.error.as_deref()).unwrap_or_else(|| "Unknown error".to_string());
            return CheckoutOutcome::Failed(CheckoutError::PaymentInitiation(reason));
        }

        self.notifier.success(GATEWAY_REDIRECT_MESSAGE);
        self.follow_gateway(&method, response).await
    }

    async fn follow_gateway(
        &self,
        method: &PaymentMethod,
        response: InitiatePaymentResponse,
    ) -> CheckoutOutcome {
        let reference = non_empty(response.reference.as_deref())
            .or_else(|| first_text(response.data.as_ref(), &["reference"]))
            .or_else(|| non_empty(response.session_id.as_deref()));
        if let Some(reference) = &reference {
            self.storage
                .set(PAYMENT_REFERENCE_KEY, reference.clone())
                .await;
        }

        let checkout_url = non_empty(response.checkout_url.as_deref()).or_else(|| {
            first_text(
                response.data.as_ref(),
                &["url", "redirecturl", "redirectUrl", "checkout_url"],
            )
        });

        if let Some(url) = checkout_url {
            info!(reference = ?reference, "redirecting to gateway checkout");
            self.navigator.redirect(&url);
            return CheckoutOutcome::GatewayRedirect { url, reference };
        }

        if method.is_card() {
            warn!(reference = ?reference, "card payment initiated without a checkout URL");
            self.ui.set_payment_in_progress(false);
            return CheckoutOutcome::Failed(CheckoutError::MissingCheckoutUrl);
        }

        if let Some(reference) = reference {
            let path = format!("/payment/{}", reference);
            self.navigator.push(&path);
            return CheckoutOutcome::PaymentPage { path };
        }

        self.ui.set_payment_in_progress(false);
        CheckoutOutcome::Failed(CheckoutError::MissingRedirect)
    }

    async fn cash_on_delivery(
        &self,
        request: &CheckoutRequest,
        draft: &OrderDraft,
        navigated_to_order: &mut bool,
    ) -> CheckoutOutcome {
        self.ui.set_suppress_empty_cart_redirect(true);

        let created = match self.orders.create_order(draft).await {
            Ok(created) => created,
            Err(e) => {
                self.ui.set_payment_in_progress(false);
                let message = describe(&e);
                let error = if message.contains("uuid") {
                    CheckoutError::InvalidProductData
                } else if message.contains("foreign key") {
                    CheckoutError::ProductUnavailable
                } else {
                    CheckoutError::OrderCreation(message)
                };
                return CheckoutOutcome::Failed(error);
            }
        };

        self.ui.set_prevent_persistence(true);
        self.ui.clear_checkout_state();
        self.ui.clear_cart();
        let redirect_to = self.navigate_after_order(request, &created, navigated_to_order);
        self.announce_order(&created);

        info!(order_id = %created.id, "cash on delivery order created");
        CheckoutOutcome::OrderPlaced {
            order_id: created.id,
            order_number: created.order_number,
            redirect_to,
            link: None,
        }
    }
}

fn describe(error: &OrderServiceError) -> String {
    let message = error.to_string();
    if message.is_empty() {
        "Unknown error".to_string()
    } else {
        message
    }
}
