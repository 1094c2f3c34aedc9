diesel::table! {
    categorias (id_categoria) {
        id_categoria -> Int4,
        nombre_categoria -> Varchar,
    }
}

diesel::table! {
    unidades_medida (id_unidad) {
        id_unidad -> Int4,
        unidad -> Varchar,
    }
}

diesel::table! {
    productos (id_producto) {
        id_producto -> Int4,
        nombre -> Varchar,
        descripcion -> Text,
        sku -> Nullable<Varchar>,
        precio_venta -> Numeric,
        costo -> Numeric,
        id_unidad -> Int4,
        id_categoria -> Int4,
        activo -> Bool,
        stock_minimo -> Numeric,
    }
}

diesel::table! {
    sucursales (id_sucursal) {
        id_sucursal -> Int4,
        nombre -> Varchar,
        direccion -> Varchar,
        telefono -> Varchar,
        responsable -> Varchar,
        activo -> Bool,
    }
}

diesel::table! {
    clientes (id_cliente) {
        id_cliente -> Int4,
        nombre -> Varchar,
        direccion -> Varchar,
        telefono -> Varchar,
        email -> Varchar,
        rfc -> Varchar,
        tipo_cliente -> Varchar,
        limite_credito -> Numeric,
        saldo_actual -> Numeric,
        activo -> Bool,
    }
}

diesel::table! {
    tipos_pago (id_tipo_pago) {
        id_tipo_pago -> Int4,
        tipo_pago -> Varchar,
    }
}

diesel::table! {
    tipos_movimiento (id_tipo_movimiento) {
        id_tipo_movimiento -> Int4,
        tipo -> Varchar,
    }
}

diesel::table! {
    inventario (id_inventario) {
        id_inventario -> Int4,
        id_producto -> Int4,
        id_sucursal -> Int4,
        stock -> Numeric,
    }
}

diesel::table! {
    movimientos_inventario (id_movimiento) {
        id_movimiento -> Int4,
        id_producto -> Int4,
        id_sucursal -> Int4,
        fecha -> Timestamptz,
        id_tipo_movimiento -> Int4,
        cantidad -> Int4,
        referencia -> Nullable<Varchar>,
        observaciones -> Nullable<Text>,
    }
}

diesel::table! {
    ventas (id_venta) {
        id_venta -> Int4,
        id_cliente -> Int4,
        id_sucursal -> Int4,
        fecha -> Timestamptz,
        total -> Numeric,
        id_tipo_pago -> Int4,
        observaciones -> Nullable<Text>,
    }
}

diesel::table! {
    detalle_ventas (id_detalle) {
        id_detalle -> Int4,
        id_venta -> Int4,
        id_producto -> Int4,
        cantidad -> Int4,
        precio_unitario -> Numeric,
        subtotal -> Numeric,
    }
}

diesel::table! {
    creditos (id_credito) {
        id_credito -> Int4,
        id_cliente -> Int4,
        id_venta -> Int4,
        monto_total -> Numeric,
        saldo_pendiente -> Numeric,
        fecha_inicio -> Timestamptz,
        fecha_vencimiento -> Timestamptz,
    }
}

diesel::table! {
    pagos_credito (id_pago) {
        id_pago -> Int4,
        id_credito -> Int4,
        fecha_pago -> Date,
        monto_pagado -> Numeric,
        metodo_pago -> Varchar,
        observaciones -> Nullable<Text>,
    }
}

diesel::table! {
    traspasos (id_traspaso) {
        id_traspaso -> Int4,
        fecha -> Timestamptz,
        id_sucursal_origen -> Int4,
        id_sucursal_destino -> Int4,
        observaciones -> Nullable<Text>,
        estado -> Varchar,
    }
}

diesel::table! {
    detalle_traspaso (id_detalle) {
        id_detalle -> Int4,
        id_traspaso -> Int4,
        id_producto -> Int4,
        cantidad -> Int4,
    }
}

diesel::table! {
    usuarios (id_usuario) {
        id_usuario -> Int4,
        nombre -> Varchar,
        email -> Varchar,
        password -> Varchar,
        rol -> Varchar,
        activo -> Bool,
        fecha_creacion -> Timestamptz,
        fecha_actualizacion -> Timestamptz,
    }
}

diesel::joinable!(productos -> categorias (id_categoria));
diesel::joinable!(productos -> unidades_medida (id_unidad));
diesel::joinable!(inventario -> productos (id_producto));
diesel::joinable!(inventario -> sucursales (id_sucursal));
diesel::joinable!(movimientos_inventario -> productos (id_producto));
diesel::joinable!(movimientos_inventario -> sucursales (id_sucursal));
diesel::joinable!(movimientos_inventario -> tipos_movimiento (id_tipo_movimiento));
diesel::joinable!(ventas -> clientes (id_cliente));
diesel::joinable!(ventas -> sucursales (id_sucursal));
diesel::joinable!(ventas -> tipos_pago (id_tipo_pago));
diesel::joinable!(detalle_ventas -> ventas (id_venta));
diesel::joinable!(detalle_ventas -> productos (id_producto));
diesel::joinable!(creditos -> clientes (id_cliente));
diesel::joinable!(creditos -> ventas (id_venta));
diesel::joinable!(pagos_credito -> creditos (id_credito));
diesel::joinable!(detalle_traspaso -> traspasos (id_traspaso));
diesel::joinable!(detalle_traspaso -> productos (id_producto));

diesel::allow_tables_to_appear_in_same_query!(
    categorias,
    unidades_medida,
    productos,
    sucursales,
    clientes,
    tipos_pago,
    tipos_movimiento,
    inventario,
    movimientos_inventario,
    ventas,
    detalle_ventas,
    creditos,
    pagos_credito,
    traspasos,
    detalle_traspaso,
    usuarios,
);
