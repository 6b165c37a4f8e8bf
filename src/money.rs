//! Money as an integer count of minor units plus a currency code
use super::error::ValidationError;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CURRENCY: &str = "IRR";
const MAX_CURRENCY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty()
            || code.len() > MAX_CURRENCY_LEN
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self(DEFAULT_CURRENCY.to_string())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Money {
    amount: i128, // minor units, never floating point
    currency: Currency,
}

impl Money {
    pub fn new(amount: i128, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Builds money from a loosely typed payload: the amount must be present and
    /// integral, a missing currency falls back to `default_currency`.
    pub fn from_parts(
        amount: Option<&str>,
        currency: Option<&str>,
        default_currency: &Currency,
    ) -> Result<Self, ValidationError> {
        let raw = amount
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or(ValidationError::MissingAmount)?;
        let amount = raw
            .parse::<i128>()
            .map_err(|_| ValidationError::InvalidAmount(raw.to_string()))?;

        let currency = match currency {
            Some(code) => Currency::new(code)?,
            None => default_currency.clone(),
        };

        Ok(Self { amount, currency })
    }

    pub fn amount(&self) -> i128 {
        self.amount
    }
    pub fn currency(&self) -> &Currency {
        &self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

// encoded as [amount as 16 big-endian bytes, currency code]
impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(2)?
            .bytes(&self.amount.to_be_bytes())?
            .str(self.currency.as_str())?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        if d.array()? != Some(2) {
            return Err(minicbor::decode::Error::message(
                "money must be an [amount, currency] pair",
            ));
        }
        let raw: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("money amount must be 16 bytes"))?;
        let currency = Currency::new(d.str()?)
            .map_err(|e| minicbor::decode::Error::message(e.to_string()))?;

        Ok(Money {
            amount: i128::from_be_bytes(raw),
            currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_defaults_when_missing() {
        let money = Money::from_parts(Some("1000"), None, &Currency::default()).unwrap();

        assert_eq!(money.amount(), 1000);
        assert_eq!(money.currency().as_str(), "IRR");
    }

    #[test]
    fn amount_is_required_and_integral() {
        let irr = Currency::default();

        assert_eq!(
            Money::from_parts(None, Some("USD"), &irr),
            Err(ValidationError::MissingAmount)
        );
        assert_eq!(
            Money::from_parts(Some("10.5"), Some("USD"), &irr),
            Err(ValidationError::InvalidAmount("10.5".into()))
        );
    }

    #[test]
    fn amounts_are_bounded_by_i128() {
        let irr = Currency::default();
        let max = i128::MAX.to_string();
        let beyond = "170141183460469231731687303715884105728"; // i128::MAX + 1

        assert_eq!(
            Money::from_parts(Some(&max), None, &irr).unwrap().amount(),
            i128::MAX
        );
        assert_eq!(
            Money::from_parts(Some(beyond), None, &irr),
            Err(ValidationError::InvalidAmount(beyond.into()))
        );
    }

    #[test]
    fn currency_codes_are_normalised() {
        assert_eq!(Currency::new(" usd ").unwrap().as_str(), "USD");
        assert!(Currency::new("").is_err());
        assert!(Currency::new("US-D").is_err());
        assert!(Currency::new("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn amounts_beyond_u64_survive_encoding() {
        let original = Money::new(i128::from(u64::MAX) * 1_000, "EUR".parse().unwrap());

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: Money = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }
}
