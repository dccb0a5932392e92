use crate::{
    entities::promo_code::{self, DiscountType, Entity as PromoCodeEntity},
    errors::ServiceError,
    services::catalog::CatalogReader,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Why a promo code cannot be applied to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PromoRejection {
    #[error("promo code not found")]
    NotFound,
    #[error("promo code has expired")]
    Expired,
    #[error("cart subtotal is below the minimum of {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error("promo code usage limit reached")]
    Exhausted,
}

impl PromoRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "promo_not_found",
            Self::Expired => "promo_expired",
            Self::BelowMinimum { .. } => "promo_below_minimum",
            Self::Exhausted => "promo_exhausted",
        }
    }
}

/// Result of a successful validation. Nothing is redeemed until the order settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PromoValidation {
    pub promo_code_id: Uuid,
    pub code: String,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

/// Discount for `subtotal`, rounded to cents and clamped to `[0, subtotal]`.
pub fn compute_discount(
    discount_type: DiscountType,
    discount_value: Decimal,
    subtotal: Decimal,
) -> Decimal {
    let raw = match discount_type {
        DiscountType::Percentage => subtotal * discount_value / Decimal::ONE_HUNDRED,
        DiscountType::Fixed => discount_value,
    };
    raw.round_dp(2).max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO))
}

/// Checks a promo against a cart subtotal at `now`. Pure.
pub fn evaluate_promo(
    promo: &promo_code::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<PromoValidation, PromoRejection> {
    if !promo.is_active {
        return Err(PromoRejection::NotFound);
    }
    if promo.expires_at.is_some_and(|expires_at| expires_at < now) {
        return Err(PromoRejection::Expired);
    }
    if let Some(minimum) = promo.minimum_amount {
        if subtotal < minimum {
            return Err(PromoRejection::BelowMinimum { minimum });
        }
    }
    if promo.max_uses.is_some_and(|max| promo.used_count >= max) {
        return Err(PromoRejection::Exhausted);
    }

    let discount_amount = compute_discount(promo.discount_type, promo.discount_value, subtotal);
    Ok(PromoValidation {
        promo_code_id: promo.id,
        code: promo.code.clone(),
        discount_amount,
        final_total: subtotal - discount_amount,
    })
}

#[derive(Clone)]
pub struct PromotionService {
    catalog: Arc<dyn CatalogReader>,
}

impl PromotionService {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    /// Validates `code` for `subtotal`; rejections surface as `ServiceError::PromoRejected`.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<PromoValidation, ServiceError> {
        if subtotal < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "cart subtotal cannot be negative".to_string(),
            ));
        }

        let promo = self
            .catalog
            .promo_code_by_code(code)
            .await?
            .ok_or(PromoRejection::NotFound)?;

        let validation = evaluate_promo(&promo, subtotal, Utc::now()).map_err(|reason| {
            debug!(reason = reason.code(), "promo code rejected");
            ServiceError::from(reason)
        })?;
        Ok(validation)
    }

    /// Counts one redemption. Atomic at the storage level; joins the caller's transaction.
    ///
    /// Returns false when the promo row no longer exists.
    pub async fn redeem<C: ConnectionTrait>(conn: &C, promo_id: Uuid) -> Result<bool, ServiceError> {
        let result = PromoCodeEntity::update_many()
            .col_expr(
                promo_code::Column::UsedCount,
                Expr::col(promo_code::Column::UsedCount).add(1),
            )
            .col_expr(promo_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(promo_code::Column::Id.eq(promo_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(%promo_id, "promo code vanished before redemption was recorded");
            return Ok(false);
        }
        counter!("coin_commerce.promo.redeemed", 1);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::MockCatalogReader;
    use chrono::Duration;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn promo(code: &str, discount_type: DiscountType, value: Decimal) -> promo_code::Model {
        promo_code::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type,
            discount_value: value,
            minimum_amount: None,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn welcome20_on_500() {
        let welcome = promo("WELCOME20", DiscountType::Percentage, dec!(20));
        let result = evaluate_promo(&welcome, dec!(500), Utc::now()).unwrap();
        assert_eq!(result.discount_amount, dec!(100));
        assert_eq!(result.final_total, dec!(400));
    }

    #[test]
    fn summer50_below_minimum() {
        let mut summer = promo("SUMMER50", DiscountType::Fixed, dec!(50));
        summer.minimum_amount = Some(dec!(200));
        let result = evaluate_promo(&summer, dec!(50), Utc::now());
        assert_eq!(
            result,
            Err(PromoRejection::BelowMinimum {
                minimum: dec!(200)
            })
        );
    }

    #[test]
    fn expired_is_checked_before_minimum() {
        let mut stale = promo("OLD", DiscountType::Fixed, dec!(5));
        stale.expires_at = Some(Utc::now() - Duration::days(1));
        stale.minimum_amount = Some(dec!(1000));
        assert_eq!(
            evaluate_promo(&stale, dec!(10), Utc::now()),
            Err(PromoRejection::Expired)
        );
    }

    #[test]
    fn inactive_reads_as_not_found() {
        let mut off = promo("OFF", DiscountType::Fixed, dec!(5));
        off.is_active = false;
        assert_eq!(
            evaluate_promo(&off, dec!(10), Utc::now()),
            Err(PromoRejection::NotFound)
        );
    }

    #[test]
    fn exhausted_when_used_reaches_max() {
        let mut limited = promo("ONCE", DiscountType::Fixed, dec!(5));
        limited.max_uses = Some(3);
        limited.used_count = 3;
        assert_eq!(
            evaluate_promo(&limited, dec!(10), Utc::now()),
            Err(PromoRejection::Exhausted)
        );
    }

    #[rstest]
    #[case(DiscountType::Fixed, dec!(50), dec!(30), dec!(30))]
    #[case(DiscountType::Percentage, dec!(150), dec!(80), dec!(80))]
    #[case(DiscountType::Percentage, dec!(15), dec!(19.99), dec!(3.00))]
    #[case(DiscountType::Fixed, dec!(0), dec!(10), dec!(0))]
    #[case(DiscountType::Fixed, dec!(5), dec!(0), dec!(0))]
    fn discount_is_clamped(
        #[case] discount_type: DiscountType,
        #[case] value: Decimal,
        #[case] subtotal: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(compute_discount(discount_type, value, subtotal), expected);
    }

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(PromoRejection::Exhausted.code(), "promo_exhausted");
        assert_eq!(
            PromoRejection::BelowMinimum { minimum: dec!(1) }.code(),
            "promo_below_minimum"
        );
    }

    #[tokio::test]
    async fn validate_maps_unknown_code_to_not_found() {
        let mut catalog = MockCatalogReader::new();
        catalog
            .expect_promo_code_by_code()
            .returning(|_| Ok(None));
        let service = PromotionService::new(Arc::new(catalog));

        let err = service.validate("NOPE", dec!(100)).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PromoRejected(PromoRejection::NotFound)
        ));
    }

    #[tokio::test]
    async fn validate_returns_discount() {
        let welcome = promo("WELCOME20", DiscountType::Percentage, dec!(20));
        let mut catalog = MockCatalogReader::new();
        catalog
            .expect_promo_code_by_code()
            .withf(|code| code == "welcome20")
            .returning(move |_| Ok(Some(welcome.clone())));
        let service = PromotionService::new(Arc::new(catalog));

        let result = service.validate("welcome20", dec!(500)).await.unwrap();
        assert_eq!(result.code, "WELCOME20");
        assert_eq!(result.final_total, dec!(400));
    }
}
