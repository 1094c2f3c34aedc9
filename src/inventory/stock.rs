//! Stock arithmetic shared by inventory adjustments, movements, sales and
//! branch transfers. Every function returns the new quantity to persist or a
//! [`StockError`]; none of them touch the database.

use bigdecimal::{BigDecimal, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::shared::utils::fits_numeric;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StockError {
    #[error("No hay suficiente stock disponible")]
    Negative,
    #[error("No hay suficiente stock para el producto {producto}")]
    Insufficient { producto: i32 },
    #[error("La cantidad debe ser mayor que cero")]
    InvalidQuantity,
    #[error("El stock no puede ser negativo")]
    NegativeValue,
    #[error("El stock resultante excede el máximo permitido")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Entrada,
    Salida,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entrada => "entrada",
            Self::Salida => "salida",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entrada" => Ok(Self::Entrada),
            "salida" => Ok(Self::Salida),
            other => Err(format!(
                "Tipo de movimiento inválido: '{other}' (se espera 'entrada' o 'salida')"
            )),
        }
    }
}

fn bounded(next: BigDecimal) -> Result<BigDecimal, StockError> {
    if fits_numeric(&next) {
        Ok(next)
    } else {
        Err(StockError::Overflow)
    }
}

/// Adds a signed delta. Used by manual adjustments, where a negative result
/// rejects the whole adjustment.
pub fn apply_delta(current: &BigDecimal, delta: &BigDecimal) -> Result<BigDecimal, StockError> {
    let next = current + delta;
    if next.is_negative() {
        return Err(StockError::Negative);
    }
    bounded(next)
}

pub fn deposit(current: &BigDecimal, cantidad: i32) -> Result<BigDecimal, StockError> {
    if cantidad <= 0 {
        return Err(StockError::InvalidQuantity);
    }
    bounded(current + BigDecimal::from(cantidad))
}

pub fn withdraw(
    current: &BigDecimal,
    cantidad: i32,
    producto: i32,
) -> Result<BigDecimal, StockError> {
    if cantidad <= 0 {
        return Err(StockError::InvalidQuantity);
    }
    let requested = BigDecimal::from(cantidad);
    if *current < requested {
        return Err(StockError::Insufficient { producto });
    }
    Ok(current - requested)
}

pub fn apply_movement(
    kind: MovementKind,
    current: &BigDecimal,
    cantidad: i32,
    producto: i32,
) -> Result<BigDecimal, StockError> {
    match kind {
        MovementKind::Entrada => deposit(current, cantidad),
        MovementKind::Salida => withdraw(current, cantidad, producto),
    }
}

pub fn set_absolute(value: &BigDecimal) -> Result<BigDecimal, StockError> {
    if value.is_negative() {
        return Err(StockError::NegativeValue);
    }
    Ok(value.clone())
}

pub fn is_low(total: &BigDecimal, minimo: &BigDecimal) -> bool {
    total <= minimo
}

pub fn line_subtotal(cantidad: i32, precio_unitario: &BigDecimal) -> BigDecimal {
    (BigDecimal::from(cantidad) * precio_unitario).round(2)
}

pub fn sale_total<'a>(lines: impl IntoIterator<Item = (i32, &'a BigDecimal)>) -> BigDecimal {
    lines
        .into_iter()
        .fold(BigDecimal::zero(), |acc, (cantidad, precio)| {
            acc + line_subtotal(cantidad, precio)
        })
        .round(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).expect("valid decimal")
    }

    #[test]
    fn test_apply_delta_adds_and_subtracts() {
        assert_eq!(apply_delta(&dec("10"), &dec("5")), Ok(dec("15")));
        assert_eq!(apply_delta(&dec("10"), &dec("-10")), Ok(dec("0")));
    }

    #[test]
    fn test_apply_delta_rejects_negative_result() {
        assert_eq!(apply_delta(&dec("3"), &dec("-4")), Err(StockError::Negative));
    }

    #[test]
    fn test_results_beyond_column_range_are_rejected() {
        let almost_full = dec("99999999.00");
        assert_eq!(deposit(&almost_full, 2), Err(StockError::Overflow));
        assert_eq!(apply_delta(&almost_full, &dec("0.99")), Ok(dec("99999999.99")));
        assert_eq!(apply_delta(&almost_full, &dec("1")), Err(StockError::Overflow));
    }

    #[test]
    fn test_withdraw_checks_available_stock() {
        assert_eq!(withdraw(&dec("5"), 5, 1), Ok(dec("0")));
        assert_eq!(
            withdraw(&dec("4.5"), 5, 12),
            Err(StockError::Insufficient { producto: 12 })
        );
        assert_eq!(withdraw(&dec("4"), 0, 1), Err(StockError::InvalidQuantity));
    }

    #[test]
    fn test_apply_movement_by_kind() {
        assert_eq!(
            apply_movement(MovementKind::Entrada, &dec("2"), 3, 1),
            Ok(dec("5"))
        );
        assert_eq!(
            apply_movement(MovementKind::Salida, &dec("2"), 3, 9),
            Err(StockError::Insufficient { producto: 9 })
        );
    }

    #[test]
    fn test_movement_kind_parsing() {
        assert_eq!("entrada".parse::<MovementKind>(), Ok(MovementKind::Entrada));
        assert_eq!(" SALIDA ".parse::<MovementKind>(), Ok(MovementKind::Salida));
        assert!("traspaso".parse::<MovementKind>().is_err());
    }

    #[test]
    fn test_set_absolute_rejects_negative() {
        assert_eq!(set_absolute(&dec("0")), Ok(dec("0")));
        assert_eq!(set_absolute(&dec("-1")), Err(StockError::NegativeValue));
    }

    #[test]
    fn test_sale_total_sums_line_subtotals() {
        let a = dec("1250.00");
        let b = dec("99.99");
        assert_eq!(line_subtotal(3, &b), dec("299.97"));
        assert_eq!(sale_total([(2, &a), (3, &b)]), dec("2799.97"));
    }

    #[test]
    fn test_is_low_includes_threshold() {
        assert!(is_low(&dec("5"), &dec("5")));
        assert!(!is_low(&dec("5.01"), &dec("5")));
    }
}
