//! Message addresses in their binary (TL-B) form.

use std::str::FromStr;

use crate::cell::*;
use crate::error::{Error, ParseAddrError};
use crate::num::Uint9;
use crate::util::{unlikely, Bitstring};

/// Any message address.
///
/// ```text
/// addr_none$00 = MsgAddressExt;
/// addr_extern$01 len:(## 9) external_address:(bits len) = MsgAddressExt;
/// addr_std$10 ... = MsgAddressInt;
/// addr_var$11 ... = MsgAddressInt;
/// ```
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum AnyAddr {
    /// Empty address.
    #[default]
    None,
    /// External address.
    Ext(ExtAddr),
    /// Standard internal address.
    Std(StdAddr),
    /// Variable-length internal address.
    Var(VarAddr),
}

impl AnyAddr {
    /// Returns the number of data bits that this struct occupies.
    pub const fn bit_len(&self) -> u16 {
        match self {
            Self::None => 2,
            Self::Ext(addr) => addr.bit_len(),
            Self::Std(addr) => addr.bit_len(),
            Self::Var(addr) => addr.bit_len(),
        }
    }

    /// Returns `true` if this is `addr_none`.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl ExactSize for AnyAddr {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: self.bit_len(),
            refs: 0,
        }
    }
}

impl From<IntAddr> for AnyAddr {
    #[inline]
    fn from(value: IntAddr) -> Self {
        match value {
            IntAddr::Std(addr) => Self::Std(addr),
            IntAddr::Var(addr) => Self::Var(addr),
        }
    }
}

impl From<StdAddr> for AnyAddr {
    #[inline]
    fn from(value: StdAddr) -> Self {
        Self::Std(value)
    }
}

impl From<ExtAddr> for AnyAddr {
    #[inline]
    fn from(value: ExtAddr) -> Self {
        Self::Ext(value)
    }
}

impl std::fmt::Display for AnyAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Ext(addr) => std::fmt::Display::fmt(addr, f),
            Self::Std(addr) => std::fmt::Display::fmt(addr, f),
            Self::Var(addr) => std::fmt::Display::fmt(addr, f),
        }
    }
}

impl Store for AnyAddr {
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        match self {
            Self::None => builder.store_zeros(2),
            Self::Ext(addr) => addr.store_into(builder, context),
            Self::Std(addr) => addr.store_into(builder, context),
            Self::Var(addr) => addr.store_into(builder, context),
        }
    }
}

impl<'a> Load<'a> for AnyAddr {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        match ok!(slice.get_small_uint(0, 2)) {
            0b00 => {
                ok!(slice.skip_first(2, 0));
                Ok(Self::None)
            }
            0b01 => ExtAddr::load_from(slice).map(Self::Ext),
            _ => IntAddr::load_from(slice).map(Self::from),
        }
    }
}

/// Internal message address.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum IntAddr {
    /// Standard internal address.
    Std(StdAddr),
    /// Variable-length internal address.
    Var(VarAddr),
}

impl Default for IntAddr {
    #[inline]
    fn default() -> Self {
        Self::Std(StdAddr::default())
    }
}

impl IntAddr {
    /// Returns the number of data bits that this struct occupies.
    pub const fn bit_len(&self) -> u16 {
        match self {
            Self::Std(addr) => addr.bit_len(),
            Self::Var(addr) => addr.bit_len(),
        }
    }

    /// Returns the workchain part of the address.
    pub const fn workchain(&self) -> i32 {
        match self {
            Self::Std(addr) => addr.workchain as i32,
            Self::Var(addr) => addr.workchain,
        }
    }
}

impl ExactSize for IntAddr {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: self.bit_len(),
            refs: 0,
        }
    }
}

impl FromStr for IntAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::Std(ok!(StdAddr::from_str(s))))
    }
}

impl std::fmt::Display for IntAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntAddr::Std(addr) => std::fmt::Display::fmt(addr, f),
            IntAddr::Var(addr) => std::fmt::Display::fmt(addr, f),
        }
    }
}

impl Store for IntAddr {
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        match self {
            Self::Std(addr) => addr.store_into(builder, context),
            Self::Var(addr) => addr.store_into(builder, context),
        }
    }
}

impl<'a> Load<'a> for IntAddr {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        match ok!(slice.get_small_uint(0, 2)) {
            0b10 => StdAddr::load_from(slice).map(Self::Std),
            0b11 => VarAddr::load_from(slice).map(Self::Var),
            _ => Err(Error::InvalidTag),
        }
    }
}

/// Standard internal address.
///
/// ```text
/// addr_std$10 anycast:(Maybe Anycast)
///     workchain_id:int8 address:bits256 = MsgAddressInt;
/// ```
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StdAddr {
    /// Optional anycast info.
    pub anycast: Option<Box<Anycast>>,
    /// Workchain id (one-byte range).
    pub workchain: i8,
    /// Account id.
    pub address: HashBytes,
}

impl StdAddr {
    /// The number of data bits that address without anycast occupies.
    ///
    /// - 2 bits id (`0b10`)
    /// - 1 bit Maybe None
    /// - 8 bits workchain
    /// - 256 bits address
    pub const BITS_WITHOUT_ANYCAST: u16 = 2 + 1 + 8 + 256;

    /// The maximum number of bits that address with anycast occupies.
    pub const BITS_MAX: u16 = Self::BITS_WITHOUT_ANYCAST + Anycast::BITS_MAX;

    /// Constructs a new standard address without anycast info.
    #[inline]
    pub const fn new(workchain: i8, address: HashBytes) -> Self {
        Self {
            anycast: None,
            workchain,
            address,
        }
    }

    /// Returns the number of data bits that this struct occupies.
    pub const fn bit_len(&self) -> u16 {
        let mut bit_len = Self::BITS_WITHOUT_ANYCAST;
        if let Some(anycast) = &self.anycast {
            bit_len += anycast.bit_len();
        }
        bit_len
    }

    /// Returns `true` if this address is in the masterchain.
    #[inline]
    pub const fn is_masterchain(&self) -> bool {
        self.workchain == -1
    }
}

impl ExactSize for StdAddr {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: self.bit_len(),
            refs: 0,
        }
    }
}

impl std::fmt::Display for StdAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(anycast) = &self.anycast {
            ok!(f.write_fmt(format_args!("{anycast}:")))
        }

        f.write_fmt(format_args!("{}:{}", self.workchain, self.address))
    }
}

impl From<StdAddr> for IntAddr {
    #[inline]
    fn from(value: StdAddr) -> Self {
        Self::Std(value)
    }
}

impl FromStr for StdAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAddrError::Empty);
        }

        let mut result = Self::default();

        let mut parts = s.split(':');
        match parts.next() {
            Some(part) => match part.parse() {
                Ok(workchain) => result.workchain = workchain,
                Err(_) => return Err(ParseAddrError::InvalidWorkchain),
            },
            None => return Err(ParseAddrError::Empty),
        }

        match parts.next() {
            Some(part) => match hex::decode_to_slice(part, &mut result.address.0) {
                Ok(()) => {}
                Err(_) => return Err(ParseAddrError::InvalidAccountId),
            },
            None => return Err(ParseAddrError::InvalidAccountId),
        }

        if parts.next().is_none() {
            Ok(result)
        } else {
            Err(ParseAddrError::UnexpectedPart)
        }
    }
}

impl Store for StdAddr {
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        if unlikely(!builder.has_capacity(self.bit_len(), 0)) {
            return Err(Error::CellOverflow);
        }
        ok!(builder.store_small_uint(0b10, 2));
        ok!(self.anycast.store_into(builder, context));
        ok!(builder.store_u8(self.workchain as u8));
        builder.store_u256(&self.address)
    }
}

impl<'a> Load<'a> for StdAddr {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let prev = *slice;
        let result = (|| {
            if ok!(slice.load_small_uint(2)) != 0b10 {
                return Err(Error::InvalidTag);
            }

            Ok(Self {
                anycast: ok!(Option::<Box<Anycast>>::load_from(slice)),
                workchain: ok!(slice.load_u8()) as i8,
                address: ok!(slice.load_u256()),
            })
        })();

        if result.is_err() {
            *slice = prev;
        }
        result
    }
}

/// Variable-length internal address.
///
/// ```text
/// addr_var$11 anycast:(Maybe Anycast) addr_len:(## 9)
///     workchain_id:int32 address:(bits addr_len) = MsgAddressInt;
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarAddr {
    /// Optional anycast info.
    pub anycast: Option<Box<Anycast>>,
    /// Address length in bits.
    pub address_len: Uint9,
    /// Workchain id (full range).
    pub workchain: i32,
    /// Variable-length address.
    pub address: Vec<u8>,
}

impl VarAddr {
    /// The maximum number of bits that address occupies.
    ///
    /// - 2 bits id (`0b11`)
    /// - 1 + `Anycast::BITS_MAX` maybe anycast
    /// - 9 bits `address_len`
    /// - 32 bits workchain
    /// - `address_len` bits of address
    pub const BITS_MAX: u16 =
        2 + 1 + Anycast::BITS_MAX + Uint9::BITS + 32 + Uint9::MAX.into_inner();

    /// Returns the number of data bits that this struct occupies.
    pub const fn bit_len(&self) -> u16 {
        let mut bit_len = 2 + 1 + Uint9::BITS + 32 + self.address_len.into_inner();
        if let Some(anycast) = &self.anycast {
            bit_len += anycast.bit_len();
        }
        bit_len
    }
}

impl ExactSize for VarAddr {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: self.bit_len(),
            refs: 0,
        }
    }
}

impl std::fmt::Display for VarAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(anycast) = &self.anycast {
            ok!(f.write_fmt(format_args!("{anycast}:")))
        }

        let address = Bitstring {
            bytes: &self.address,
            bit_len: self.address_len.into_inner(),
        };
        f.write_fmt(format_args!("{}:{address}", self.workchain))
    }
}

impl From<VarAddr> for IntAddr {
    #[inline]
    fn from(value: VarAddr) -> Self {
        Self::Var(value)
    }
}

impl Store for VarAddr {
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        let address_len = self.address_len.into_inner();
        if unlikely(
            !self.address_len.is_valid() || (self.address.len() * 8) < address_len as usize,
        ) {
            return Err(Error::InvalidData);
        }
        if unlikely(!builder.has_capacity(self.bit_len(), 0)) {
            return Err(Error::CellOverflow);
        }
        ok!(builder.store_small_uint(0b11, 2));
        ok!(self.anycast.store_into(builder, context));
        ok!(self.address_len.store_into(builder, context));
        ok!(builder.store_u32(self.workchain as u32));
        builder.store_raw(&self.address, address_len)
    }
}

impl<'a> Load<'a> for VarAddr {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let prev = *slice;
        let result = (|| {
            if ok!(slice.load_small_uint(2)) != 0b11 {
                return Err(Error::InvalidTag);
            }

            let anycast = ok!(Option::<Box<Anycast>>::load_from(slice));
            let address_len = ok!(Uint9::load_from(slice));
            let workchain = ok!(slice.load_u32()) as i32;

            let bits = address_len.into_inner();
            let mut address = vec![0; (bits as usize + 7) / 8];
            ok!(slice.load_raw(&mut address, bits));

            Ok(Self {
                anycast,
                address_len,
                workchain,
                address,
            })
        })();

        if result.is_err() {
            *slice = prev;
        }
        result
    }
}

/// External address.
///
/// ```text
/// addr_extern$01 len:(## 9) external_address:(bits len) = MsgAddressExt;
/// ```
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExtAddr {
    /// Number of bits stored in data.
    pub data_bit_len: Uint9,
    /// External address data
    pub data: Vec<u8>,
}

impl ExtAddr {
    /// Creates non-empty external address.
    pub fn new<T>(data_bit_len: u16, data: T) -> Option<Self>
    where
        T: Into<Vec<u8>>,
    {
        let data_bit_len = Uint9::new(data_bit_len);
        let data = data.into();
        if data_bit_len.is_valid() && data.len() * 8 >= data_bit_len.into_inner() as usize {
            Some(Self { data_bit_len, data })
        } else {
            None
        }
    }

    /// Returns the number of data bits that this struct occupies.
    pub const fn bit_len(&self) -> u16 {
        2 + Uint9::BITS + self.data_bit_len.into_inner()
    }
}

impl ExactSize for ExtAddr {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: self.bit_len(),
            refs: 0,
        }
    }
}

impl std::fmt::Display for ExtAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bitstring = Bitstring {
            bytes: &self.data,
            bit_len: self.data_bit_len.into_inner(),
        };
        write!(f, ":{bitstring}")
    }
}

impl FromStr for ExtAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAddrError::Empty);
        }
        let Some(data) = s.strip_prefix(':') else {
            return Err(ParseAddrError::UnexpectedPart);
        };
        let Ok((data, bit_len)) = Bitstring::from_hex_str(data) else {
            return Err(ParseAddrError::InvalidAccountId);
        };
        ExtAddr::new(bit_len, data).ok_or(ParseAddrError::InvalidAccountId)
    }
}

impl Store for ExtAddr {
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        let data_bit_len = self.data_bit_len.into_inner();
        if unlikely(!self.data_bit_len.is_valid() || self.data.len() * 8 < data_bit_len as usize) {
            return Err(Error::InvalidData);
        }
        if unlikely(!builder.has_capacity(self.bit_len(), 0)) {
            return Err(Error::CellOverflow);
        }
        ok!(builder.store_small_uint(0b01, 2));
        ok!(self.data_bit_len.store_into(builder, context));
        builder.store_raw(&self.data, data_bit_len)
    }
}

impl<'a> Load<'a> for ExtAddr {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let prev = *slice;
        let result = (|| {
            if ok!(slice.load_small_uint(2)) != 0b01 {
                return Err(Error::InvalidTag);
            }

            let data_bit_len = ok!(Uint9::load_from(slice));
            let bits = data_bit_len.into_inner();
            let mut data = vec![0; (bits as usize + 7) / 8];
            ok!(slice.load_raw(&mut data, bits));
            Ok(Self { data_bit_len, data })
        })();

        if result.is_err() {
            *slice = prev;
        }
        result
    }
}

/// Anycast prefix info.
///
/// ```text
/// anycast_info$_ depth:(#<= 30) { depth >= 1 } rewrite_pfx:(bits depth) = Anycast;
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Anycast {
    /// Prefix length in bits.
    pub depth: u8,
    /// Rewrite prefix data.
    pub rewrite_prefix: Vec<u8>,
}

impl Anycast {
    /// The minimum allowed number of bits in the rewrite prefix.
    pub const MIN_DEPTH: u8 = 1;
    /// The maximum allowed number of bits in the rewrite prefix.
    pub const MAX_DEPTH: u8 = 30;

    /// The number of bits that the depth occupies.
    pub const DEPTH_BITS: u16 = 5;

    /// The maximum number of bits that an Anycast occupies.
    pub const BITS_MAX: u16 = Self::DEPTH_BITS + Self::MAX_DEPTH as u16;

    /// Constructs anycast info from rewrite prefix.
    pub fn from_slice(rewrite_prefix: &CellSlice<'_>) -> Result<Self, Error> {
        let depth = rewrite_prefix.size_bits();
        if unlikely(!(Self::MIN_DEPTH as u16..=Self::MAX_DEPTH as u16).contains(&depth)) {
            return Err(Error::IntOverflow);
        }

        let mut data = vec![0; (depth as usize + 7) / 8];
        ok!(rewrite_prefix.get_raw(0, &mut data, depth));

        Ok(Self {
            depth: depth as u8,
            rewrite_prefix: data,
        })
    }

    /// Returns the number of data bits that this struct occupies.
    pub const fn bit_len(&self) -> u16 {
        Self::DEPTH_BITS + self.depth as u16
    }
}

impl std::fmt::Display for Anycast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bitstring = Bitstring {
            bytes: &self.rewrite_prefix,
            bit_len: self.depth as u16,
        };
        std::fmt::Display::fmt(&bitstring, f)
    }
}

impl Store for Anycast {
    fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        if unlikely(
            self.depth < Self::MIN_DEPTH
                || self.depth > Self::MAX_DEPTH
                || self.rewrite_prefix.len() * 8 < self.depth as usize,
        ) {
            return Err(Error::IntOverflow);
        }
        if unlikely(!builder.has_capacity(self.bit_len(), 0)) {
            return Err(Error::CellOverflow);
        }
        ok!(builder.store_uint_leq(self.depth as u64, Self::MAX_DEPTH as u64));
        builder.store_raw(&self.rewrite_prefix, self.depth as u16)
    }
}

impl<'a> Load<'a> for Anycast {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let prev = *slice;
        let result = (|| {
            let depth = ok!(slice.load_uint_leq(Self::MAX_DEPTH as u64)) as u16;
            if unlikely(depth < Self::MIN_DEPTH as u16) {
                return Err(Error::InvalidData);
            }

            let mut rewrite_prefix = vec![0; (depth as usize + 7) / 8];
            ok!(slice.load_raw(&mut rewrite_prefix, depth));

            Ok(Self {
                depth: depth as u8,
                rewrite_prefix,
            })
        })();

        if result.is_err() {
            *slice = prev;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(value: &T) -> T
    where
        T: Store + ExactSize + for<'a> Load<'a>,
    {
        let cell = CellBuilder::build_from(value).unwrap();
        assert_eq!(cell.bit_len(), value.exact_size().bits);
        let mut slice = cell.as_slice().unwrap();
        let parsed = T::load_from(&mut slice).unwrap();
        slice.end_parse().unwrap();
        parsed
    }

    #[test]
    fn std_addr_layout() {
        let addr: StdAddr = "-1:3333333333333333333333333333333333333333333333333333333333333333"
            .parse()
            .unwrap();
        assert!(addr.is_masterchain());
        assert_eq!(addr.bit_len(), 267);

        let cell = CellBuilder::build_from(&addr).unwrap();
        assert_eq!(cell.bit_len(), 267);
        assert_eq!(cell.data()[0], 0b1001_1111);
        assert_eq!(roundtrip(&addr), addr);
        assert_eq!(
            addr.to_string(),
            "-1:3333333333333333333333333333333333333333333333333333333333333333"
        );
    }

    #[test]
    fn parse_errors() {
        assert!(matches!("".parse::<StdAddr>(), Err(ParseAddrError::Empty)));
        assert!(matches!(
            "1000:00".parse::<StdAddr>(),
            Err(ParseAddrError::InvalidWorkchain)
        ));
        assert!(matches!(
            "0:zz".parse::<StdAddr>(),
            Err(ParseAddrError::InvalidAccountId)
        ));
        assert!(matches!(
            "0:0000000000000000000000000000000000000000000000000000000000000000:1"
                .parse::<StdAddr>(),
            Err(ParseAddrError::UnexpectedPart)
        ));
    }

    #[test]
    fn anycast_addresses() {
        let anycast = Anycast {
            depth: 12,
            rewrite_prefix: vec![0xab, 0xc0],
        };
        assert_eq!(anycast.to_string(), "abc");

        let std = StdAddr {
            anycast: Some(Box::new(anycast.clone())),
            workchain: 0,
            address: HashBytes([0x11; 32]),
        };
        assert_eq!(std.bit_len(), 267 + 5 + 12);
        assert_eq!(roundtrip(&std), std);

        let var = VarAddr {
            anycast: Some(Box::new(anycast)),
            address_len: Uint9::new(20),
            workchain: 123456,
            address: vec![0xde, 0xad, 0xb0],
        };
        assert_eq!(roundtrip(&var), var);
        assert_eq!(var.to_string(), "abc:123456:deadb");

        let invalid = Anycast {
            depth: 31,
            rewrite_prefix: vec![0; 4],
        };
        assert!(CellBuilder::build_from(&invalid).is_err());
    }

    #[test]
    fn any_addr_variants() {
        let none = AnyAddr::None;
        assert_eq!(CellBuilder::build_from(&none).unwrap().bit_len(), 2);
        assert_eq!(roundtrip(&none), none);

        let ext = AnyAddr::Ext(ExtAddr::new(10, vec![0xff, 0xc0]).unwrap());
        assert_eq!(roundtrip(&ext), ext);
        assert_eq!(ext.to_string(), ":ffe_");
        assert_eq!(AnyAddr::Ext(":ffe_".parse().unwrap()), ext);
        assert!(matches!(
            "ffe_".parse::<ExtAddr>(),
            Err(ParseAddrError::UnexpectedPart)
        ));

        let std = AnyAddr::Std(StdAddr::new(0, HashBytes([0x42; 32])));
        assert_eq!(roundtrip(&std), std);

        let var = AnyAddr::Var(VarAddr {
            anycast: None,
            address_len: Uint9::new(256),
            workchain: -7,
            address: vec![0x55; 32],
        });
        assert_eq!(roundtrip(&var), var);

        assert!(ExtAddr::new(600, vec![]).is_none());
    }

    #[test]
    fn int_addr_rejects_external() {
        let ext = AnyAddr::Ext(ExtAddr::new(0, vec![]).unwrap());
        let cell = CellBuilder::build_from(&ext).unwrap();
        let mut slice = cell.as_slice().unwrap();
        assert_eq!(IntAddr::load_from(&mut slice), Err(Error::InvalidTag));
        assert_eq!(slice.size_bits(), cell.bit_len());
    }
}
